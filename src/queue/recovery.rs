//! Startup reconciliation of the processing list.

use std::time::Duration;
use tokio::time::Instant;

use super::store::{JobStore, StoreResult};

#[derive(Debug, Clone, Copy)]
pub struct RecoveryLimits {
    pub max_items: usize,
    pub time_budget: Duration,
}

impl Default for RecoveryLimits {
    fn default() -> Self {
        Self {
            max_items: 10_000,
            time_budget: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Payloads moved back to the ready list.
    pub recovered: usize,
    /// Payloads still in the processing list when recovery stopped.
    pub remaining: usize,
    /// Stopped on the item cap or time budget rather than an empty list.
    pub truncated: bool,
}

/// Move every payload left in the processing list back to the ready list.
///
/// Anything in the processing list at startup was claimed by a consumer that
/// never acked it. Stops at `limits` and leaves the rest for the next start.
pub async fn recover_orphans(
    store: &dyn JobStore,
    queue: &str,
    limits: RecoveryLimits,
) -> StoreResult<RecoveryReport> {
    let started = Instant::now();
    let mut report = RecoveryReport::default();

    loop {
        if report.recovered >= limits.max_items || started.elapsed() >= limits.time_budget {
            report.truncated = true;
            break;
        }
        match store.requeue_orphan(queue).await? {
            Some(payload) => {
                report.recovered += 1;
                tracing::debug!(queue, payload = %payload, "Requeued orphaned job");
            }
            None => break,
        }
    }

    if report.truncated {
        report.remaining = store.processing_len(queue).await?;
        if report.remaining == 0 {
            report.truncated = false;
        } else {
            tracing::warn!(
                queue,
                recovered = report.recovered,
                remaining = report.remaining,
                "Orphan recovery stopped early; remaining jobs are retried on next start"
            );
        }
    }

    if report.recovered > 0 {
        tracing::info!(queue, recovered = report.recovered, "Recovered orphaned jobs");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::memory::MemoryJobStore;

    const Q: &str = "metadata";

    async fn store_with_orphans(n: usize) -> MemoryJobStore {
        let store = MemoryJobStore::new();
        for i in 0..n {
            store.push(Q, &format!("job-{i}")).await.unwrap();
            store.claim(Q, Duration::from_millis(1)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_recovers_everything() {
        let store = store_with_orphans(3).await;

        let report = recover_orphans(&store, Q, RecoveryLimits::default())
            .await
            .unwrap();

        assert_eq!(report.recovered, 3);
        assert_eq!(report.remaining, 0);
        assert!(!report.truncated);
        assert_eq!(store.ready_len(Q).await.unwrap(), 3);
        assert_eq!(store.processing_len(Q).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_item_cap() {
        let store = store_with_orphans(5).await;
        let limits = RecoveryLimits {
            max_items: 2,
            ..Default::default()
        };

        let report = recover_orphans(&store, Q, limits).await.unwrap();

        assert_eq!(report.recovered, 2);
        assert_eq!(report.remaining, 3);
        assert!(report.truncated);
    }

    #[tokio::test]
    async fn test_exact_cap_is_not_truncated() {
        let store = store_with_orphans(2).await;
        let limits = RecoveryLimits {
            max_items: 2,
            ..Default::default()
        };

        let report = recover_orphans(&store, Q, limits).await.unwrap();
        assert_eq!(report.recovered, 2);
        assert!(!report.truncated);
    }

    #[tokio::test]
    async fn test_zero_budget_recovers_nothing() {
        let store = store_with_orphans(1).await;
        let limits = RecoveryLimits {
            time_budget: Duration::ZERO,
            ..Default::default()
        };

        let report = recover_orphans(&store, Q, limits).await.unwrap();
        assert_eq!(report.recovered, 0);
        assert_eq!(report.remaining, 1);
    }
}
