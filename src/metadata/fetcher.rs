//! Provider lookup plus artwork processing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use marquee_common::ImageRole;

use super::provider::{MediaMetadataResult, MetadataProvider};
use crate::images::ImagePipeline;
use crate::queue::Job;

pub struct MetadataFetcher {
    provider: Arc<dyn MetadataProvider>,
    images: Arc<ImagePipeline>,
    timeout: Duration,
}

impl MetadataFetcher {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        images: Arc<ImagePipeline>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            images,
            timeout,
        }
    }

    pub fn provider(&self) -> &dyn MetadataProvider {
        self.provider.as_ref()
    }

    /// Look the job up with the provider and cache its artwork locally.
    ///
    /// `Ok(None)` means the provider has no match. Image URLs in the result
    /// are replaced by local stored paths where processing succeeded.
    pub async fn fetch(&self, job: &Job) -> Result<Option<MediaMetadataResult>> {
        let lookup = self
            .provider
            .fetch_metadata(&job.title, job.year, job.media_type);

        let found = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => result?,
            Err(_) => anyhow::bail!(
                "{} lookup timed out after {}s",
                self.provider.name(),
                self.timeout.as_secs()
            ),
        };

        let Some(mut result) = found else {
            return Ok(None);
        };
        result.external_id_source = self.provider.external_id_source();

        let sources: Vec<(ImageRole, Option<String>)> = ImageRole::ALL
            .iter()
            .map(|role| (*role, result.image(*role).map(str::to_string)))
            .collect();

        let processed = self
            .images
            .process_all(job.media_type, &result.source_id, &sources)
            .await;
        for image in processed {
            result.set_image(image.role, image.path);
        }

        tracing::debug!(
            media_id = %job.media_id,
            source = %result.external_id_source,
            source_id = %result.source_id,
            "Fetched metadata"
        );
        Ok(Some(result))
    }
}
