//! Redis-backed job store.
//!
//! Lists: `{queue}` (ready, pushed on the left, claimed from the right) and
//! `{queue}:processing`. All cross-list moves are single `LMOVE` commands or
//! Lua scripts, so a payload is never observable in both lists or in neither.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Script};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::store::{processing_key, JobStore, StoreError, StoreResult};

const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(100);

mod scripts {
    use redis::Script;

    /// Swap a payload in the processing list for its successor.
    pub fn park() -> Script {
        Script::new(
            r#"
            local removed = redis.call('LREM', KEYS[1], 1, ARGV[1])
            if removed > 0 then
                redis.call('LPUSH', KEYS[1], ARGV[2])
            end
            return removed
            "#,
        )
    }

    /// Move a specific payload from processing back to ready.
    pub fn release() -> Script {
        Script::new(
            r#"
            local removed = redis.call('LREM', KEYS[1], 1, ARGV[1])
            if removed > 0 then
                redis.call('LPUSH', KEYS[2], ARGV[1])
            end
            return removed
            "#,
        )
    }
}

pub struct RedisJobStore {
    client: redis::Client,
    manager: Mutex<Option<ConnectionManager>>,
    ready: AtomicBool,
    park_script: Script,
    release_script: Script,
}

impl RedisJobStore {
    /// Create a store for `url`. No connection is made until [`JobStore::ping`].
    pub fn new(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Backend(format!("invalid redis url: {e}")))?;

        Ok(Self {
            client,
            manager: Mutex::new(None),
            ready: AtomicBool::new(false),
            park_script: scripts::park(),
            release_script: scripts::release(),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        if !self.is_ready() {
            return Err(StoreError::NotReady);
        }
        self.manager.lock().await.clone().ok_or(StoreError::NotReady)
    }

    /// Convert a redis error, dropping to not-ready on connection faults.
    fn classify(&self, err: RedisError) -> StoreError {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            if self.ready.swap(false, Ordering::AcqRel) {
                tracing::warn!(error = %err, "Lost connection to Redis");
            }
            StoreError::NotReady
        } else {
            StoreError::Backend(err.to_string())
        }
    }

    async fn lmove(&self, from: &str, to: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection().await?;
        redis::cmd("LMOVE")
            .arg(from)
            .arg(to)
            .arg("RIGHT")
            .arg("LEFT")
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| self.classify(e))
    }

    async fn llen(&self, key: &str) -> StoreResult<usize> {
        let mut conn = self.connection().await?;
        redis::cmd("LLEN")
            .arg(key)
            .query_async::<usize>(&mut conn)
            .await
            .map_err(|e| self.classify(e))
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn ping(&self) -> StoreResult<()> {
        let mut guard = self.manager.lock().await;

        if guard.is_none() {
            let manager = ConnectionManager::new(self.client.clone())
                .await
                .map_err(|e| self.classify(e))?;
            *guard = Some(manager);
        }

        let mut conn = match guard.as_ref() {
            Some(manager) => manager.clone(),
            None => return Err(StoreError::NotReady),
        };
        drop(guard);

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| self.classify(e))?;

        if !self.ready.swap(true, Ordering::AcqRel) {
            tracing::info!("Connected to Redis");
        }
        Ok(())
    }

    async fn push(&self, queue: &str, payload: &str) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("LPUSH")
            .arg(queue)
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    async fn claim(&self, queue: &str, timeout: Duration) -> StoreResult<Option<String>> {
        // Polling the non-blocking LMOVE keeps the shared multiplexed
        // connection free for other workers.
        let processing = processing_key(queue);
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(payload) = self.lmove(queue, &processing).await? {
                return Ok(Some(payload));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(CLAIM_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn ack(&self, queue: &str, payload: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let removed = redis::cmd("LREM")
            .arg(processing_key(queue))
            .arg(1)
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(removed > 0)
    }

    async fn park(&self, queue: &str, old: &str, new: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let removed = self
            .park_script
            .key(processing_key(queue))
            .arg(old)
            .arg(new)
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(removed > 0)
    }

    async fn release(&self, queue: &str, payload: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let removed = self
            .release_script
            .key(processing_key(queue))
            .key(queue)
            .arg(payload)
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(removed > 0)
    }

    async fn requeue_orphan(&self, queue: &str) -> StoreResult<Option<String>> {
        self.lmove(&processing_key(queue), queue).await
    }

    async fn ready_len(&self, queue: &str) -> StoreResult<usize> {
        self.llen(queue).await
    }

    async fn processing_len(&self, queue: &str) -> StoreResult<usize> {
        self.llen(&processing_key(queue)).await
    }
}
