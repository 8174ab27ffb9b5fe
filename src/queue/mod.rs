//! Durable metadata job queue.
//!
//! Jobs live in a ready list and a processing list per named queue (see
//! [`JobStore`]). The [`QueueConsumer`] claims jobs atomically into the
//! processing list, runs them through a [`JobHandler`] and then acks, retries
//! with exponential backoff, or drops them. Jobs orphaned in the processing
//! list by a crash are moved back by [`recover_orphans`] at startup.

pub mod backoff;
pub mod consumer;
pub mod job;
pub mod memory;
pub mod recovery;
pub mod redis_store;
pub mod store;

pub use backoff::RetryPolicy;
pub use consumer::{
    ConsumerSettings, ConsumerStats, JobHandler, JobOutcome, QueueConsumer, StatsSnapshot,
};
pub use job::Job;
pub use memory::MemoryJobStore;
pub use recovery::{recover_orphans, RecoveryLimits, RecoveryReport};
pub use redis_store::RedisJobStore;
pub use store::{processing_key, JobStore, StoreError, StoreResult};

/// Serialize `job` and push it onto the ready list of `queue`.
pub async fn enqueue(store: &dyn JobStore, queue: &str, job: &Job) -> StoreResult<()> {
    let payload = job.to_payload()?;
    store.push(queue, &payload).await?;
    tracing::info!(queue, media_id = %job.media_id, title = %job.title, "Enqueued metadata job");
    Ok(())
}
