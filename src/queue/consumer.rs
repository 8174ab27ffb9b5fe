//! Bounded-concurrency queue consumer.
//!
//! Each of `concurrency` workers loops claim → handle → ack/retry/drop with
//! at most one job in flight. Retries are parked in the processing list and
//! released to the ready list by a timer task once their backoff elapses, so
//! a crash during a backoff leaves the job where startup recovery finds it.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::RetryPolicy;
use super::job::Job;
use super::recovery::{recover_orphans, RecoveryLimits};
use super::store::{JobStore, StoreError};
use crate::config::QueueConfig;

/// Result of running one job through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Already satisfied; nothing was fetched.
    Skipped,
    Success,
    /// Transient failure; retried with backoff until the ceiling.
    Retryable(String),
    /// Can never succeed; dropped immediately.
    Terminal(String),
}

/// Pipeline invoked by the consumer for each claimed job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobOutcome;

    /// Called exactly once when a job leaves the queue without success,
    /// either terminally or after exhausting its retries.
    async fn on_dropped(&self, job: &Job, reason: &str);
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub queue: String,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub claim_timeout: Duration,
    pub reconnect_interval: Duration,
    pub recovery: RecoveryLimits,
}

impl From<&QueueConfig> for ConsumerSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            queue: config.name.clone(),
            concurrency: config.concurrency,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.base_delay_ms),
            },
            claim_timeout: config.claim_timeout(),
            reconnect_interval: config.reconnect_interval(),
            recovery: RecoveryLimits {
                max_items: config.recovery_max_items,
                time_budget: config.recovery_time_budget(),
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    in_flight: AtomicUsize,
    acked: AtomicU64,
    skipped: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
    exhausted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub in_flight: usize,
    /// Jobs removed after success, including skips.
    pub acked: u64,
    pub skipped: u64,
    pub retried: u64,
    /// Terminal drops, including malformed payloads.
    pub dropped: u64,
    pub exhausted: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            in_flight: self.in_flight.load(Ordering::Acquire),
            acked: self.acked.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Acquire),
            retried: self.retried.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
            exhausted: self.exhausted.load(Ordering::Acquire),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::AcqRel);
    }
}

/// Decrements the in-flight gauge when the job finishes, even on panic.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(gauge: &'a AtomicUsize) -> Self {
        gauge.fetch_add(1, Ordering::AcqRel);
        Self(gauge)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Clone)]
pub struct QueueConsumer {
    store: Arc<dyn JobStore>,
    handler: Arc<dyn JobHandler>,
    settings: Arc<ConsumerSettings>,
    stats: Arc<ConsumerStats>,
}

impl QueueConsumer {
    pub fn new(
        store: Arc<dyn JobStore>,
        handler: Arc<dyn JobHandler>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            store,
            handler,
            settings: Arc::new(settings),
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    /// Wait for the store, recover orphans, then run the workers until
    /// `shutdown` is cancelled and every in-flight job has finished.
    pub async fn run(&self, shutdown: CancellationToken) {
        let queue = self.settings.queue.as_str();

        loop {
            if !self.wait_for_store(&shutdown).await {
                info!(queue, "Consumer stopped before the job store became ready");
                return;
            }
            match recover_orphans(self.store.as_ref(), queue, self.settings.recovery).await {
                Ok(_) => break,
                Err(e) => {
                    warn!(queue, error = %e, "Orphan recovery failed; waiting for job store");
                    if !self.pause(&shutdown).await {
                        return;
                    }
                }
            }
        }

        info!(
            queue,
            concurrency = self.settings.concurrency,
            "Queue consumer started"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.settings.concurrency {
            let consumer = self.clone();
            let shutdown = shutdown.clone();
            workers.spawn(async move { consumer.worker_loop(worker_id, shutdown).await });
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(queue, error = %e, "Queue worker terminated abnormally");
            }
        }

        info!(queue, stats = ?self.stats.snapshot(), "Queue consumer drained");
    }

    /// Ping until the store answers. Returns `false` if shut down first.
    async fn wait_for_store(&self, shutdown: &CancellationToken) -> bool {
        let mut attempts = 0u32;
        loop {
            if shutdown.is_cancelled() {
                return false;
            }
            match self.store.ping().await {
                Ok(()) => return true,
                Err(e) => {
                    attempts += 1;
                    if attempts == 1 {
                        warn!(error = %e, "Job store not ready; retrying");
                    } else {
                        debug!(error = %e, attempts, "Job store still not ready");
                    }
                }
            }
            if !self.pause(shutdown).await {
                return false;
            }
        }
    }

    /// Sleep one reconnect interval. Returns `false` if shut down first.
    async fn pause(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.settings.reconnect_interval) => true,
        }
    }

    async fn worker_loop(&self, worker_id: usize, shutdown: CancellationToken) {
        let queue = self.settings.queue.as_str();
        debug!(queue, worker_id, "Worker started");

        while !shutdown.is_cancelled() {
            match self.store.claim(queue, self.settings.claim_timeout).await {
                Ok(Some(payload)) => self.process(payload, &shutdown).await,
                Ok(None) => {}
                Err(StoreError::NotReady) => {
                    if !self.wait_for_store(&shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(queue, worker_id, error = %e, "Claim failed");
                    if !self.pause(&shutdown).await {
                        break;
                    }
                }
            }
        }

        debug!(queue, worker_id, "Worker stopped");
    }

    async fn process(&self, payload: String, shutdown: &CancellationToken) {
        let _guard = InFlight::enter(&self.stats.in_flight);
        let queue = self.settings.queue.as_str();

        let job = match Job::from_payload(&payload) {
            Ok(job) => job,
            Err(e) => {
                error!(queue, payload = %payload, error = %e, "Dropping malformed job");
                let removal = Removal::Dropped {
                    job: None,
                    reason: e.to_string(),
                    exhausted: false,
                };
                self.remove(payload, removal, shutdown).await;
                return;
            }
        };

        debug!(
            queue,
            media_id = %job.media_id,
            retry_count = job.retry_count,
            "Processing job"
        );

        match self.handler.handle(&job).await {
            JobOutcome::Skipped => {
                self.remove(payload, Removal::Acked { skipped: true }, shutdown)
                    .await;
            }
            JobOutcome::Success => {
                self.remove(payload, Removal::Acked { skipped: false }, shutdown)
                    .await;
            }
            JobOutcome::Terminal(reason) => {
                error!(
                    queue,
                    media_id = %job.media_id,
                    reason = %reason,
                    payload = %payload,
                    "Dropping job: non-retryable failure"
                );
                let removal = Removal::Dropped {
                    job: Some(job),
                    reason,
                    exhausted: false,
                };
                self.remove(payload, removal, shutdown).await;
            }
            JobOutcome::Retryable(reason) => {
                self.retry(job, payload, reason, shutdown).await;
            }
        }
    }

    async fn retry(&self, job: Job, payload: String, reason: String, shutdown: &CancellationToken) {
        let queue = self.settings.queue.as_str();
        let next = job.next_attempt();

        let Some(delay) = self.settings.retry.delay_for(next.retry_count) else {
            error!(
                queue,
                media_id = %job.media_id,
                retry_count = job.retry_count,
                reason = %reason,
                payload = %payload,
                "Dropping job: retries exhausted"
            );
            let removal = Removal::Dropped {
                job: Some(job),
                reason,
                exhausted: true,
            };
            self.remove(payload, removal, shutdown).await;
            return;
        };

        let next_payload = match next.to_payload() {
            Ok(p) => p,
            Err(e) => {
                error!(queue, payload = %payload, error = %e, "Could not serialize retry; left for recovery");
                return;
            }
        };

        let retry = Retry {
            media_id: job.media_id.to_string(),
            original: payload,
            next: next_payload,
            retry_count: next.retry_count,
            delay,
            reason,
        };

        let parked = self.store.park(queue, &retry.original, &retry.next).await;
        match parked {
            Ok(true) => {
                self.parked(&retry);
                let consumer = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    consumer.release_after(retry.next, retry.delay, shutdown).await;
                });
            }
            Ok(false) => {
                warn!(queue, media_id = %job.media_id, "Job vanished from processing list; not retrying");
            }
            Err(e) => {
                warn!(queue, media_id = %job.media_id, error = %e, "Could not park retry; retrying in background");
                let consumer = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { consumer.park_eventually(retry, shutdown).await });
            }
        }
    }

    fn parked(&self, retry: &Retry) {
        ConsumerStats::bump(&self.stats.retried);
        warn!(
            queue = self.settings.queue.as_str(),
            media_id = %retry.media_id,
            retry_count = retry.retry_count,
            delay_ms = retry.delay.as_millis() as u64,
            reason = %retry.reason,
            "Job failed; retrying after backoff"
        );
    }

    /// Keep trying to park a retry until the store comes back, then run its
    /// backoff. Abandoned at shutdown; the original stays for startup recovery.
    async fn park_eventually(&self, retry: Retry, shutdown: CancellationToken) {
        let queue = self.settings.queue.as_str();

        loop {
            if !self.reconnect(&shutdown).await {
                debug!(queue, media_id = %retry.media_id, "Shutting down; unparked retry left for recovery");
                return;
            }
            match self.store.park(queue, &retry.original, &retry.next).await {
                Ok(true) => break,
                Ok(false) => {
                    warn!(queue, media_id = %retry.media_id, "Job vanished from processing list; not retrying");
                    return;
                }
                Err(e) => debug!(queue, error = %e, "Park failed; will try again"),
            }
        }

        self.parked(&retry);
        self.release_after(retry.next, retry.delay, shutdown).await;
    }

    /// Move a parked retry back to the ready list once its delay elapses.
    /// Abandoned at shutdown; the payload stays parked for startup recovery.
    async fn release_after(&self, payload: String, delay: Duration, shutdown: CancellationToken) {
        let queue = self.settings.queue.as_str();

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        loop {
            match self.store.release(queue, &payload).await {
                Ok(true) => {
                    debug!(queue, "Released retry to ready list");
                    return;
                }
                Ok(false) => {
                    warn!(queue, payload = %payload, "Parked retry no longer in processing list");
                    return;
                }
                Err(e) => {
                    debug!(queue, error = %e, "Release failed; will try again");
                    if !self.reconnect(&shutdown).await {
                        return;
                    }
                }
            }
        }
    }

    /// Wait one reconnect interval and ping the store so a store that
    /// flagged itself not ready can recover. Returns `false` if shut down.
    async fn reconnect(&self, shutdown: &CancellationToken) -> bool {
        if !self.pause(shutdown).await {
            return false;
        }
        if let Err(e) = self.store.ping().await {
            debug!(queue = self.settings.queue.as_str(), error = %e, "Job store still not ready");
        }
        true
    }

    /// Ack a payload and record how it left. If the store errors, the ack is
    /// retried in the background so the worker can move on.
    async fn remove(&self, payload: String, removal: Removal, shutdown: &CancellationToken) {
        let queue = self.settings.queue.as_str();
        match self.store.ack(queue, &payload).await {
            Ok(found) => self.removed(&payload, removal, found).await,
            Err(e) => {
                warn!(queue, error = %e, "Ack failed; retrying in background");
                let consumer = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { consumer.remove_eventually(payload, removal, shutdown).await });
            }
        }
    }

    /// Abandoned at shutdown; the payload stays for startup recovery.
    async fn remove_eventually(&self, payload: String, removal: Removal, shutdown: CancellationToken) {
        let queue = self.settings.queue.as_str();
        loop {
            if !self.reconnect(&shutdown).await {
                debug!(queue, "Shutting down; unacked job left for recovery");
                return;
            }
            match self.store.ack(queue, &payload).await {
                Ok(found) => {
                    self.removed(&payload, removal, found).await;
                    return;
                }
                Err(e) => debug!(queue, error = %e, "Ack failed; will try again"),
            }
        }
    }

    async fn removed(&self, payload: &str, removal: Removal, found: bool) {
        if !found {
            warn!(queue = self.settings.queue.as_str(), payload = %payload, "Acked job was not in processing list");
            return;
        }
        match removal {
            Removal::Acked { skipped } => {
                ConsumerStats::bump(&self.stats.acked);
                if skipped {
                    ConsumerStats::bump(&self.stats.skipped);
                }
            }
            Removal::Dropped {
                job,
                reason,
                exhausted,
            } => {
                if exhausted {
                    ConsumerStats::bump(&self.stats.exhausted);
                } else {
                    ConsumerStats::bump(&self.stats.dropped);
                }
                if let Some(job) = job {
                    self.handler.on_dropped(&job, &reason).await;
                }
            }
        }
    }
}

/// How a payload leaves the processing list.
enum Removal {
    Acked { skipped: bool },
    /// `job` is `None` for payloads that never parsed.
    Dropped {
        job: Option<Job>,
        reason: String,
        exhausted: bool,
    },
}

/// A failed attempt waiting to be parked and released.
struct Retry {
    media_id: String,
    original: String,
    next: String,
    retry_count: u32,
    delay: Duration,
    reason: String,
}
