//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which owns a temporary directory holding a file
//! backed database and an image cache, an in-memory job store, and helpers to
//! seed libraries, media and scan jobs. [`StubProvider`] stands in for TMDB.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use marquee::app;
use marquee::config::Config;
use marquee::metadata::{MediaMetadataResult, MetadataProcessor, MetadataProvider};
use marquee::queue::{
    ConsumerSettings, Job, JobStore, MemoryJobStore, QueueConsumer, RecoveryLimits, RetryPolicy,
    StatsSnapshot,
};
use marquee_common::{LibraryId, MediaType, ScanJobId};
use marquee_db::models::{Media, NewMedia};
use marquee_db::pool::{get_conn, init_pool, DbPool, PooledConnection};
use marquee_db::queries::{libraries, media, scan_jobs};
use tokio_util::sync::CancellationToken;

pub const QUEUE: &str = "metadata";

/// What the stub answers for every lookup.
#[derive(Clone)]
pub enum StubReply {
    Found(MediaMetadataResult),
    NotFound,
    Fail(String),
}

/// Provider double that counts lookups and replays a fixed answer.
pub struct StubProvider {
    reply: Mutex<StubReply>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new(reply: StubReply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
        })
    }

    /// A match with text metadata only, so no images are downloaded.
    pub fn found(title: &str, source_id: &str) -> Arc<Self> {
        Self::new(StubReply::Found(MediaMetadataResult {
            source_id: source_id.to_string(),
            title: title.to_string(),
            overview: Some(format!("{title} overview")),
            release_date: Some("1999-03-31".to_string()),
            rating: Some(8.2),
            genres: vec!["Action".to_string(), "Science Fiction".to_string()],
            ..Default::default()
        }))
    }

    pub fn set_reply(&self, reply: StubReply) {
        *self.reply.lock() = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProvider for StubProvider {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    async fn fetch_metadata(
        &self,
        _title: &str,
        _year: Option<i32>,
        _media_type: MediaType,
    ) -> anyhow::Result<Option<MediaMetadataResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reply.lock().clone() {
            StubReply::Found(result) => Ok(Some(result)),
            StubReply::NotFound => Ok(None),
            StubReply::Fail(msg) => Err(anyhow::anyhow!(msg)),
        }
    }
}

pub struct TestHarness {
    pub dir: tempfile::TempDir,
    pub config: Config,
    pub db: DbPool,
    pub store: Arc<MemoryJobStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");

        let mut config = Config::default();
        config.database.path = dir.path().join("marquee.db");
        config.images.cache_dir = dir.path().join("images");
        config.queue.name = QUEUE.to_string();

        let db = init_pool(&config.database.path.to_string_lossy())
            .expect("failed to create database pool");

        Self {
            dir,
            config,
            db,
            store: Arc::new(MemoryJobStore::new()),
        }
    }

    pub fn conn(&self) -> PooledConnection {
        get_conn(&self.db).expect("failed to get connection")
    }

    pub fn processor(&self, provider: Arc<dyn MetadataProvider>) -> MetadataProcessor {
        app::build_processor(&self.config, self.db.clone(), provider)
            .expect("failed to build processor")
    }

    /// Consumer with test-friendly timings and the given retry policy.
    pub fn consumer(
        &self,
        provider: Arc<dyn MetadataProvider>,
        concurrency: usize,
        retry: RetryPolicy,
    ) -> QueueConsumer {
        let settings = ConsumerSettings {
            queue: QUEUE.to_string(),
            concurrency,
            retry,
            claim_timeout: Duration::from_millis(50),
            reconnect_interval: Duration::from_millis(100),
            recovery: RecoveryLimits::default(),
        };
        QueueConsumer::new(
            self.store.clone(),
            Arc::new(self.processor(provider)),
            settings,
        )
    }

    pub fn create_library(&self) -> LibraryId {
        libraries::create_library(&self.conn(), "Movies", MediaType::Movie)
            .expect("failed to create library")
            .id
    }

    pub fn create_media(&self, library_id: LibraryId, title: &str) -> Media {
        media::insert_media(
            &self.conn(),
            &NewMedia {
                library_id,
                media_type: MediaType::Movie,
                title: title.to_string(),
                year: Some(1999),
                folder_path: Some(format!("/movies/{title}")),
                filename: Some(format!("{title}.mkv")),
            },
        )
        .expect("failed to insert media")
    }

    pub fn get_media(&self, media: &Media) -> Option<Media> {
        media::get_media(&self.conn(), media.id).expect("failed to load media")
    }

    /// Scan job that finished its directory scan with `scanned` items.
    pub fn completed_scan(&self, library_id: LibraryId, scanned: i64) -> ScanJobId {
        let conn = self.conn();
        let job = scan_jobs::create_scan_job(&conn, library_id).expect("create scan job");
        scan_jobs::start_scan(&conn, job.id).expect("start scan");
        scan_jobs::set_scanned_count(&conn, job.id, scanned).expect("set scanned count");
        scan_jobs::complete_scan(&conn, job.id).expect("complete scan");
        job.id
    }

    pub fn scan_job(&self, id: ScanJobId) -> marquee_db::models::ScanJob {
        scan_jobs::get_scan_job(&self.conn(), id)
            .expect("failed to load scan job")
            .expect("scan job missing")
    }

    pub fn job_for(&self, media: &Media, scan_job_id: Option<ScanJobId>) -> Job {
        let mut job = Job::new(media.id, media.library_id, &media.title, media.media_type);
        job.year = media.year;
        job.scan_job_id = scan_job_id;
        job
    }

    pub async fn push(&self, job: &Job) {
        marquee::queue::enqueue(self.store.as_ref(), QUEUE, job)
            .await
            .expect("failed to enqueue");
    }
}

/// Run `consumer` until `done` holds for its stats, then shut it down and
/// wait for the drain. Panics if `done` never holds within 20 seconds.
pub async fn run_until<F>(consumer: &QueueConsumer, done: F)
where
    F: Fn(StatsSnapshot) -> bool,
{
    run_until_within(consumer, Duration::from_secs(20), done).await
}

pub async fn run_until_within<F>(consumer: &QueueConsumer, limit: Duration, done: F)
where
    F: Fn(StatsSnapshot) -> bool,
{
    let token = CancellationToken::new();
    let runner = {
        let consumer = consumer.clone();
        let token = token.clone();
        tokio::spawn(async move { consumer.run(token).await })
    };

    let stats = consumer.stats();
    let deadline = tokio::time::Instant::now() + limit;
    let mut reached = false;
    while tokio::time::Instant::now() < deadline {
        if done(stats.snapshot()) {
            reached = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    token.cancel();
    runner.await.expect("consumer task panicked");
    assert!(reached, "condition not reached; stats: {:?}", stats.snapshot());
}

/// Tiny solid-colour image encoded as `format`.
pub fn image_bytes(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 128]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, format)
        .expect("failed to encode test image");
    out.into_inner()
}

pub fn ready_len(store: &MemoryJobStore) -> usize {
    store.ready_items(QUEUE).len()
}

pub fn processing_len(store: &MemoryJobStore) -> usize {
    store.processing_items(QUEUE).len()
}

/// Convenience for tests that need the trait object.
pub fn as_store(store: &Arc<MemoryJobStore>) -> Arc<dyn JobStore> {
    store.clone()
}
