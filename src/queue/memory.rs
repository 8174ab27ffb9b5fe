//! In-process job store.
//!
//! Same list semantics as the Redis store, kept in memory. Used by the
//! `memory` queue backend and throughout the tests, where
//! [`MemoryJobStore::set_connected`] simulates a backend outage.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use super::store::{JobStore, StoreError, StoreResult};

/// Front is the newest entry, back is the oldest, matching LPUSH/RPOP.
#[derive(Default)]
struct Lists {
    ready: VecDeque<String>,
    processing: VecDeque<String>,
}

#[derive(Default)]
pub struct MemoryJobStore {
    queues: Mutex<HashMap<String, Lists>>,
    pushed: Notify,
    disconnected: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing or regaining the backend.
    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::Release);
        if connected {
            self.pushed.notify_waiters();
        }
    }

    /// Snapshot of the ready list, oldest first.
    pub fn ready_items(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .get(queue)
            .map(|l| l.ready.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the processing list, oldest first.
    pub fn processing_items(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .get(queue)
            .map(|l| l.processing.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    fn check(&self) -> StoreResult<()> {
        if self.disconnected.load(Ordering::Acquire) {
            Err(StoreError::NotReady)
        } else {
            Ok(())
        }
    }

    fn with_lists<T>(&self, queue: &str, f: impl FnOnce(&mut Lists) -> T) -> StoreResult<T> {
        self.check()?;
        let mut queues = self.queues.lock();
        Ok(f(queues.entry(queue.to_string()).or_default()))
    }

    fn try_claim(&self, queue: &str) -> StoreResult<Option<String>> {
        self.with_lists(queue, |lists| {
            let payload = lists.ready.pop_back()?;
            lists.processing.push_front(payload.clone());
            Some(payload)
        })
    }
}

fn remove_one(list: &mut VecDeque<String>, payload: &str) -> bool {
    match list.iter().position(|p| p == payload) {
        Some(idx) => list.remove(idx).is_some(),
        None => false,
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }

    async fn push(&self, queue: &str, payload: &str) -> StoreResult<()> {
        self.with_lists(queue, |lists| lists.ready.push_front(payload.to_string()))?;
        self.pushed.notify_one();
        Ok(())
    }

    async fn claim(&self, queue: &str, timeout: Duration) -> StoreResult<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.pushed.notified();
            if let Some(payload) = self.try_claim(queue)? {
                return Ok(Some(payload));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_claim(queue);
            }
        }
    }

    async fn ack(&self, queue: &str, payload: &str) -> StoreResult<bool> {
        self.with_lists(queue, |lists| remove_one(&mut lists.processing, payload))
    }

    async fn park(&self, queue: &str, old: &str, new: &str) -> StoreResult<bool> {
        self.with_lists(queue, |lists| {
            let removed = remove_one(&mut lists.processing, old);
            if removed {
                lists.processing.push_front(new.to_string());
            }
            removed
        })
    }

    async fn release(&self, queue: &str, payload: &str) -> StoreResult<bool> {
        let released = self.with_lists(queue, |lists| {
            let removed = remove_one(&mut lists.processing, payload);
            if removed {
                lists.ready.push_front(payload.to_string());
            }
            removed
        })?;
        if released {
            self.pushed.notify_one();
        }
        Ok(released)
    }

    async fn requeue_orphan(&self, queue: &str) -> StoreResult<Option<String>> {
        let moved = self.with_lists(queue, |lists| {
            let payload = lists.processing.pop_back()?;
            lists.ready.push_front(payload.clone());
            Some(payload)
        })?;
        if moved.is_some() {
            self.pushed.notify_one();
        }
        Ok(moved)
    }

    async fn ready_len(&self, queue: &str) -> StoreResult<usize> {
        self.with_lists(queue, |lists| lists.ready.len())
    }

    async fn processing_len(&self, queue: &str) -> StoreResult<usize> {
        self.with_lists(queue, |lists| lists.processing.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const Q: &str = "metadata";

    #[tokio::test]
    async fn test_fifo_claim_and_ack() {
        let store = MemoryJobStore::new();
        store.push(Q, "a").await.unwrap();
        store.push(Q, "b").await.unwrap();

        let first = store.claim(Q, Duration::from_millis(10)).await.unwrap();
        assert_eq!(first.as_deref(), Some("a"));
        assert_eq!(store.ready_items(Q), vec!["b"]);
        assert_eq!(store.processing_items(Q), vec!["a"]);

        assert!(store.ack(Q, "a").await.unwrap());
        assert!(!store.ack(Q, "a").await.unwrap());
        assert_eq!(store.processing_len(Q).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_times_out_when_empty() {
        let store = MemoryJobStore::new();
        let claimed = store.claim(Q, Duration::from_millis(20)).await.unwrap();
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn test_claim_wakes_on_push() {
        let store = Arc::new(MemoryJobStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.claim(Q, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.push(Q, "late").await.unwrap();

        let claimed = waiter.await.unwrap().unwrap();
        assert_eq!(claimed.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_park_and_release() {
        let store = MemoryJobStore::new();
        store.push(Q, "v0").await.unwrap();
        store.claim(Q, Duration::from_millis(10)).await.unwrap();

        assert!(store.park(Q, "v0", "v1").await.unwrap());
        assert_eq!(store.processing_items(Q), vec!["v1"]);
        assert!(!store.park(Q, "v0", "v2").await.unwrap());

        assert!(store.release(Q, "v1").await.unwrap());
        assert_eq!(store.ready_items(Q), vec!["v1"]);
        assert!(store.processing_items(Q).is_empty());
        assert!(!store.release(Q, "v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_requeue_orphan_oldest_first() {
        let store = MemoryJobStore::new();
        for p in ["a", "b", "c"] {
            store.push(Q, p).await.unwrap();
        }
        store.claim(Q, Duration::from_millis(10)).await.unwrap();
        store.claim(Q, Duration::from_millis(10)).await.unwrap();

        assert_eq!(store.requeue_orphan(Q).await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.requeue_orphan(Q).await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.requeue_orphan(Q).await.unwrap(), None);
        assert_eq!(store.ready_items(Q), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_disconnected_fails_fast() {
        let store = MemoryJobStore::new();
        store.set_connected(false);

        assert!(matches!(store.ping().await, Err(StoreError::NotReady)));
        assert!(matches!(
            store.claim(Q, Duration::from_secs(30)).await,
            Err(StoreError::NotReady)
        ));
        assert!(matches!(store.push(Q, "x").await, Err(StoreError::NotReady)));

        store.set_connected(true);
        store.ping().await.unwrap();
        store.push(Q, "x").await.unwrap();
    }
}
