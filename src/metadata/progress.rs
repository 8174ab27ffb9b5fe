//! Scan job progress: outcome counters and the derived percentage.

use marquee_common::{MetadataStatus, ScanJobId, ScanStatus};
use marquee_db::models::ScanJob;
use marquee_db::pool::{get_conn, DbPool};
use marquee_db::queries::scan_jobs::{self, MetadataOutcome};

use crate::queue::Job;

/// Overall progress of a scan job, 0 to 100.
///
/// The directory scan accounts for the first half and metadata for the
/// second, which only starts counting once the scan completed.
pub fn progress(job: &ScanJob) -> u8 {
    match job.scan_status {
        ScanStatus::Failed | ScanStatus::Pending => 0,
        ScanStatus::InProgress | ScanStatus::Paused => 25,
        ScanStatus::Completed => match job.metadata_status {
            MetadataStatus::NotStarted | MetadataStatus::Pending => 50,
            MetadataStatus::Completed | MetadataStatus::Failed => 100,
            MetadataStatus::InProgress => {
                if job.scanned_count <= 0 {
                    return 50;
                }
                let processed = job.processed_count().max(0);
                let pct = 50 + (50 * processed) / job.scanned_count;
                pct.clamp(50, 100) as u8
            }
        },
    }
}

/// Records job outcomes against their parent scan job.
///
/// Tracking is best-effort: failures are logged and swallowed so they never
/// affect the job itself.
pub struct ProgressTracker {
    pool: DbPool,
}

impl ProgressTracker {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn record_success(&self, job: &Job) {
        self.record(job, MetadataOutcome::Success);
    }

    pub fn record_failure(&self, job: &Job) {
        self.record(job, MetadataOutcome::Failure);
    }

    fn record(&self, job: &Job, outcome: MetadataOutcome) {
        match self.try_record(job, outcome) {
            Ok(Some(scan)) => {
                tracing::debug!(
                    scan_job_id = %scan.id,
                    success = scan.metadata_success_count,
                    failed = scan.metadata_failed_count,
                    scanned = scan.scanned_count,
                    status = %scan.metadata_status,
                    "Recorded metadata outcome"
                );
                if scan.metadata_status == MetadataStatus::Completed
                    && scan.processed_count() == scan.scanned_count
                {
                    tracing::info!(
                        scan_job_id = %scan.id,
                        success = scan.metadata_success_count,
                        failed = scan.metadata_failed_count,
                        "Metadata processing complete"
                    );
                }
            }
            Ok(None) => {
                tracing::debug!(
                    media_id = %job.media_id,
                    library_id = %job.library_id,
                    "No scan job to record outcome against"
                );
            }
            Err(e) => {
                tracing::warn!(
                    media_id = %job.media_id,
                    error = %e,
                    "Failed to record metadata outcome"
                );
            }
        }
    }

    fn try_record(
        &self,
        job: &Job,
        outcome: MetadataOutcome,
    ) -> marquee_common::Result<Option<ScanJob>> {
        let conn = get_conn(&self.pool)?;
        let scan_id: Option<ScanJobId> = match job.scan_job_id {
            Some(id) => Some(id),
            None => scan_jobs::latest_for_library(&conn, job.library_id)?.map(|s| s.id),
        };
        match scan_id {
            Some(id) => scan_jobs::record_metadata_outcome(&conn, id, outcome),
            None => Ok(None),
        }
    }
}
