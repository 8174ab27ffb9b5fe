//! The metadata pipeline: validate → fetch → update → track.

use async_trait::async_trait;
use tracing::{debug, info};

use super::fetcher::MetadataFetcher;
use super::progress::ProgressTracker;
use super::updater::MetadataUpdater;
use super::validator::{MetadataValidator, Validation};
use crate::queue::{Job, JobHandler, JobOutcome};

pub struct MetadataProcessor {
    validator: MetadataValidator,
    fetcher: MetadataFetcher,
    updater: MetadataUpdater,
    progress: ProgressTracker,
}

impl MetadataProcessor {
    pub fn new(
        validator: MetadataValidator,
        fetcher: MetadataFetcher,
        updater: MetadataUpdater,
        progress: ProgressTracker,
    ) -> Self {
        Self {
            validator,
            fetcher,
            updater,
            progress,
        }
    }
}

#[async_trait]
impl JobHandler for MetadataProcessor {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let source = self.fetcher.provider().external_id_source();

        match self.validator.validate(job, &source) {
            Ok(Validation::MediaNotFound) => {
                return JobOutcome::Terminal(format!("media {} not found", job.media_id));
            }
            Ok(Validation::AlreadySatisfied) => {
                debug!(media_id = %job.media_id, "Metadata already complete; skipping");
                self.progress.record_success(job);
                return JobOutcome::Skipped;
            }
            Ok(Validation::NeedsFetch(_)) => {}
            Err(e) => return JobOutcome::Retryable(format!("validation failed: {e:#}")),
        }

        let result = match self.fetcher.fetch(job).await {
            Ok(Some(result)) => result,
            Ok(None) => {
                return JobOutcome::Retryable(format!(
                    "no {} match for {:?}",
                    self.fetcher.provider().name(),
                    job.title
                ));
            }
            Err(e) => return JobOutcome::Retryable(format!("fetch failed: {e:#}")),
        };

        match self.updater.apply(job.media_id, &job.title, &result) {
            Ok(true) => {
                info!(
                    media_id = %job.media_id,
                    title = %result.title,
                    source_id = %result.source_id,
                    "Metadata updated"
                );
                self.progress.record_success(job);
                JobOutcome::Success
            }
            Ok(false) => {
                JobOutcome::Terminal(format!("media {} deleted during processing", job.media_id))
            }
            Err(e) => JobOutcome::Retryable(format!("update failed: {e:#}")),
        }
    }

    async fn on_dropped(&self, job: &Job, _reason: &str) {
        self.progress.record_failure(job);
    }
}
