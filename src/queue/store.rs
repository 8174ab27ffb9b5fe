//! The two-list job store abstraction.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Key of the processing list belonging to `queue`.
pub fn processing_key(queue: &str) -> String {
    format!("{queue}:processing")
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store is disconnected; callers should back off and `ping`.
    #[error("job store is not ready")]
    NotReady,

    #[error("job store backend error: {0}")]
    Backend(String),

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable ready/processing list pair per named queue.
///
/// Payloads are opaque strings. A payload is in at most one of the two lists
/// at a time; every move between them is atomic.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Check the backend, restoring readiness on success.
    async fn ping(&self) -> StoreResult<()>;

    /// Append a payload to the ready list.
    async fn push(&self, queue: &str, payload: &str) -> StoreResult<()>;

    /// Atomically move the oldest ready payload to the processing list,
    /// waiting up to `timeout` for one to appear.
    async fn claim(&self, queue: &str, timeout: Duration) -> StoreResult<Option<String>>;

    /// Remove one matching payload from the processing list.
    async fn ack(&self, queue: &str, payload: &str) -> StoreResult<bool>;

    /// Atomically replace `old` in the processing list with `new`.
    ///
    /// Used to hold a retry-incremented payload in the processing list for
    /// the duration of its backoff. Returns `false` without writing if `old`
    /// is no longer in the processing list.
    async fn park(&self, queue: &str, old: &str, new: &str) -> StoreResult<bool>;

    /// Atomically move a parked payload from processing back to ready.
    async fn release(&self, queue: &str, payload: &str) -> StoreResult<bool>;

    /// Move the oldest processing payload back onto the ready list.
    /// Returns `None` when the processing list is empty.
    async fn requeue_orphan(&self, queue: &str) -> StoreResult<Option<String>>;

    async fn ready_len(&self, queue: &str) -> StoreResult<usize>;

    async fn processing_len(&self, queue: &str) -> StoreResult<usize>;
}
