//! Scan job queries, including the atomic metadata progress update.

use chrono::Utc;
use marquee_common::{Error, LibraryId, MetadataStatus, Result, ScanJobId, ScanStatus};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::models::ScanJob;

const COLS: &str = "id, library_id, scan_status, metadata_status, scanned_count,
    metadata_success_count, metadata_failed_count, started_at, completed_at,
    metadata_started_at, metadata_completed_at, created_at";

/// Outcome of one metadata job, as counted against its scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOutcome {
    /// Enriched, or skipped because it was already enriched.
    Success,
    /// Dropped without enrichment.
    Failure,
}

/// Create a scan job in `PENDING` / `NOT_STARTED` state.
pub fn create_scan_job(conn: &Connection, library_id: LibraryId) -> Result<ScanJob> {
    let id = ScanJobId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO scan_jobs (id, library_id, scan_status, metadata_status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            id.to_string(),
            library_id.to_string(),
            ScanStatus::Pending.as_str(),
            MetadataStatus::NotStarted.as_str(),
            &now,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    get_scan_job(conn, id)?.ok_or_else(|| Error::internal(format!("scan job {id} vanished")))
}

/// Get a scan job by ID.
pub fn get_scan_job(conn: &Connection, id: ScanJobId) -> Result<Option<ScanJob>> {
    let q = format!("SELECT {COLS} FROM scan_jobs WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], ScanJob::from_row) {
        Ok(job) => Ok(Some(job)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// The most recently created scan job of a library.
pub fn latest_for_library(conn: &Connection, library_id: LibraryId) -> Result<Option<ScanJob>> {
    let q = format!(
        "SELECT {COLS} FROM scan_jobs WHERE library_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT 1"
    );
    match conn.query_row(&q, [library_id.to_string()], ScanJob::from_row) {
        Ok(job) => Ok(Some(job)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Mark the directory scan as running.
pub fn start_scan(conn: &Connection, id: ScanJobId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE scan_jobs SET scan_status = ?1, started_at = COALESCE(started_at, ?2)
             WHERE id = ?3",
            rusqlite::params![
                ScanStatus::InProgress.as_str(),
                Utc::now().to_rfc3339(),
                id.to_string()
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Set the number of media items discovered by the scan.
pub fn set_scanned_count(conn: &Connection, id: ScanJobId, count: i64) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE scan_jobs SET scanned_count = ?1 WHERE id = ?2",
            rusqlite::params![count, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Update the scan status without touching metadata fields.
pub fn set_scan_status(conn: &Connection, id: ScanJobId, status: ScanStatus) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE scan_jobs SET scan_status = ?1 WHERE id = ?2",
            rusqlite::params![status.as_str(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark the directory scan as finished.
///
/// Metadata that has not started yet moves to `PENDING`. If every scanned
/// item already reached an outcome (jobs can finish before the scan does),
/// metadata is marked complete in the same transaction.
pub fn complete_scan(conn: &Connection, id: ScanJobId) -> Result<Option<ScanJob>> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| Error::database(e.to_string()))?;
    let now = Utc::now().to_rfc3339();

    let n = tx
        .execute(
            "UPDATE scan_jobs SET
                scan_status = ?1,
                completed_at = ?2,
                metadata_status = CASE WHEN metadata_status = ?3 THEN ?4 ELSE metadata_status END
             WHERE id = ?5",
            rusqlite::params![
                ScanStatus::Completed.as_str(),
                &now,
                MetadataStatus::NotStarted.as_str(),
                MetadataStatus::Pending.as_str(),
                id.to_string(),
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    if n == 0 {
        return Ok(None);
    }

    complete_metadata_if_done(&tx, id, &now)?;
    let job = get_scan_job(&tx, id)?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(job)
}

/// Count one metadata outcome against a scan job.
///
/// Runs as a single `IMMEDIATE` transaction so concurrent workers serialise
/// on the increment, the first-outcome status flip and the completion check:
///
/// - the success or failure counter is incremented;
/// - `NOT_STARTED`/`PENDING` metadata flips to `IN_PROGRESS` and
///   `metadata_started_at` is stamped;
/// - once `scanned_count > 0` and `success + failed >= scanned_count`,
///   metadata flips to `COMPLETED` and `metadata_completed_at` is stamped.
///
/// Returns the updated job, or `None` if it does not exist.
pub fn record_metadata_outcome(
    conn: &Connection,
    id: ScanJobId,
    outcome: MetadataOutcome,
) -> Result<Option<ScanJob>> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| Error::database(e.to_string()))?;
    let now = Utc::now().to_rfc3339();
    let (success, failed) = match outcome {
        MetadataOutcome::Success => (1, 0),
        MetadataOutcome::Failure => (0, 1),
    };

    let n = tx
        .execute(
            "UPDATE scan_jobs SET
                metadata_success_count = metadata_success_count + ?1,
                metadata_failed_count = metadata_failed_count + ?2,
                metadata_started_at = CASE WHEN metadata_status IN (?3, ?4)
                    THEN ?5 ELSE metadata_started_at END,
                metadata_status = CASE WHEN metadata_status IN (?3, ?4)
                    THEN ?6 ELSE metadata_status END
             WHERE id = ?7",
            rusqlite::params![
                success,
                failed,
                MetadataStatus::NotStarted.as_str(),
                MetadataStatus::Pending.as_str(),
                &now,
                MetadataStatus::InProgress.as_str(),
                id.to_string(),
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    if n == 0 {
        return Ok(None);
    }

    complete_metadata_if_done(&tx, id, &now)?;
    let job = get_scan_job(&tx, id)?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(job)
}

fn complete_metadata_if_done(conn: &Connection, id: ScanJobId, now: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE scan_jobs SET metadata_status = ?1, metadata_completed_at = ?2
             WHERE id = ?3
               AND scanned_count > 0
               AND metadata_success_count + metadata_failed_count >= scanned_count
               AND metadata_status != ?1",
            rusqlite::params![MetadataStatus::Completed.as_str(), now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
