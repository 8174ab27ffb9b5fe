//! Integration tests for the metadata pipeline: validation, fetch, artwork
//! caching, persistence and scan job accounting.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use image::{GenericImageView, ImageFormat};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{image_bytes, run_until, StubProvider, StubReply, TestHarness};
use marquee::images::{ImagePipeline, ImageStorage};
use marquee::metadata::MediaMetadataResult;
use marquee::queue::{JobHandler, JobOutcome, RetryPolicy};
use marquee_common::{ImageRole, MediaId, MediaType, MetadataStatus};
use marquee_db::models::MetadataUpdate;
use marquee_db::queries::{external_ids, genres, media};

/// Give `record` complete metadata with a locally cached poster.
fn enrich_locally(h: &TestHarness, record: &marquee_db::models::Media) {
    let poster = "/images/movies/posters/603.jpg";
    let file = h.config.images.cache_dir.join("movies/posters/603.jpg");
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(&file, b"\xFF\xD8\xFF cached").unwrap();

    let conn = h.conn();
    media::update_metadata(
        &conn,
        record.id,
        &MetadataUpdate {
            title: record.title.clone(),
            overview: Some("A hacker learns the truth.".into()),
            poster_path: Some(poster.into()),
            ..Default::default()
        },
    )
    .unwrap();
    external_ids::upsert_external_id(&conn, record.id, "TMDB", "603").unwrap();
}

#[tokio::test]
async fn complete_record_is_skipped_without_provider_call() {
    let h = TestHarness::new();
    let library = h.create_library();
    let record = h.create_media(library, "The Matrix");
    enrich_locally(&h, &record);

    let provider = StubProvider::found("The Matrix", "603");
    let processor = h.processor(provider.clone());

    let outcome = processor.handle(&h.job_for(&record, None)).await;

    assert_eq!(outcome, JobOutcome::Skipped);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn rescan_forces_a_fetch() {
    let h = TestHarness::new();
    let library = h.create_library();
    let record = h.create_media(library, "The Matrix");
    enrich_locally(&h, &record);

    let provider = StubProvider::found("The Matrix", "603");
    let processor = h.processor(provider.clone());
    let mut job = h.job_for(&record, None);
    job.rescan = true;

    assert_eq!(processor.handle(&job).await, JobOutcome::Success);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn deleted_cache_file_triggers_refetch() {
    let h = TestHarness::new();
    let library = h.create_library();
    let record = h.create_media(library, "The Matrix");
    enrich_locally(&h, &record);
    std::fs::remove_file(h.config.images.cache_dir.join("movies/posters/603.jpg")).unwrap();

    let provider = StubProvider::found("The Matrix", "603");
    let processor = h.processor(provider.clone());

    assert_eq!(
        processor.handle(&h.job_for(&record, None)).await,
        JobOutcome::Success
    );
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn fetched_metadata_is_persisted() {
    let h = TestHarness::new();
    let library = h.create_library();
    let record = h.create_media(library, "the matrix");

    let provider = StubProvider::found("The Matrix", "603");
    let processor = h.processor(provider.clone());

    let outcome = processor.handle(&h.job_for(&record, None)).await;
    assert_eq!(outcome, JobOutcome::Success);

    let updated = h.get_media(&record).unwrap();
    assert_eq!(updated.title, "The Matrix");
    assert_eq!(updated.overview.as_deref(), Some("The Matrix overview"));
    assert_eq!(updated.release_date.as_deref(), Some("1999-03-31"));
    assert_eq!(updated.rating, Some(8.2));

    let conn = h.conn();
    let ids = external_ids::list_for_media(&conn, record.id).unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0].source, "TMDB");
    assert_eq!(ids[0].external_id, "603");

    let names: Vec<String> = genres::list_media_genres(&conn, record.id)
        .unwrap()
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Action".to_string()));
    assert!(names.contains(&"Science Fiction".to_string()));
}

#[tokio::test]
async fn provider_miss_and_error_are_retryable() {
    let h = TestHarness::new();
    let library = h.create_library();
    let record = h.create_media(library, "Unknown Film");
    let job = h.job_for(&record, None);

    let provider = StubProvider::new(StubReply::NotFound);
    let processor = h.processor(provider.clone());
    assert_matches!(processor.handle(&job).await, JobOutcome::Retryable(_));

    provider.set_reply(StubReply::Fail("connection reset".into()));
    assert_matches!(
        processor.handle(&job).await,
        JobOutcome::Retryable(reason) if reason.contains("connection reset")
    );
    assert_eq!(provider.calls(), 2);

    // Nothing was written.
    let unchanged = h.get_media(&record).unwrap();
    assert!(unchanged.overview.is_none());
}

#[tokio::test]
async fn missing_media_is_dropped_and_counted_once() {
    let h = TestHarness::new();
    let library = h.create_library();
    let record = h.create_media(library, "Ghost");
    let scan = h.completed_scan(library, 1);

    let mut job = h.job_for(&record, Some(scan));
    job.media_id = MediaId::new();
    h.push(&job).await;

    let provider = StubProvider::found("Ghost", "1");
    let consumer = h.consumer(provider.clone(), 1, RetryPolicy::default());
    run_until(&consumer, |s| s.dropped == 1).await;

    let stats = consumer.stats().snapshot();
    assert_eq!(stats.retried, 0);
    assert_eq!(provider.calls(), 0);

    let scan = h.scan_job(scan);
    assert_eq!(scan.metadata_success_count, 0);
    assert_eq!(scan.metadata_failed_count, 1);
    assert_eq!(scan.metadata_status, MetadataStatus::Completed);
}

#[tokio::test]
async fn outcome_without_scan_id_counts_against_latest_scan() {
    let h = TestHarness::new();
    let library = h.create_library();
    let record = h.create_media(library, "The Matrix");
    let scan = h.completed_scan(library, 2);

    let provider = StubProvider::found("The Matrix", "603");
    let processor = h.processor(provider);
    processor.handle(&h.job_for(&record, None)).await;

    let scan = h.scan_job(scan);
    assert_eq!(scan.metadata_success_count, 1);
    assert_eq!(scan.metadata_status, MetadataStatus::InProgress);
    assert!(scan.metadata_started_at.is_some());
}

// ---------------------------------------------------------------------------
// Artwork
// ---------------------------------------------------------------------------

fn pipeline(h: &TestHarness) -> ImagePipeline {
    let storage = Arc::new(ImageStorage::new(
        h.config.images.cache_dir.clone(),
        "/images/",
    ));
    ImagePipeline::new(storage, Duration::from_secs(5)).unwrap()
}

async fn serve_png(server: &MockServer, at: &str, width: u32, height: u32) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(image_bytes(width, height, ImageFormat::Png))
                .insert_header("content-type", "image/png"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn poster_is_resized_to_jpeg() {
    let h = TestHarness::new();
    let server = MockServer::start().await;
    serve_png(&server, "/p/poster.png", 1000, 1500).await;

    let stored = pipeline(&h)
        .process(
            MediaType::Movie,
            ImageRole::Poster,
            "603",
            &format!("{}/p/poster.png", server.uri()),
        )
        .await
        .unwrap();

    assert_eq!(stored, "/images/movies/posters/603.jpg");
    let bytes = std::fs::read(h.config.images.cache_dir.join("movies/posters/603.jpg")).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!(img.dimensions(), (500, 750));
}

#[tokio::test]
async fn small_backdrop_is_not_upscaled() {
    let h = TestHarness::new();
    let server = MockServer::start().await;
    serve_png(&server, "/p/backdrop.png", 640, 360).await;

    pipeline(&h)
        .process(
            MediaType::Tv,
            ImageRole::Backdrop,
            "1399",
            &format!("{}/p/backdrop.png", server.uri()),
        )
        .await
        .unwrap();

    let bytes = std::fs::read(h.config.images.cache_dir.join("tv/backdrops/1399.jpg")).unwrap();
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!(img.dimensions(), (640, 360));
}

#[tokio::test]
async fn logo_keeps_alpha_as_png() {
    let h = TestHarness::new();
    let server = MockServer::start().await;
    serve_png(&server, "/p/logo.png", 600, 200).await;

    let stored = pipeline(&h)
        .process(
            MediaType::Movie,
            ImageRole::Logo,
            "603",
            &format!("{}/p/logo.png", server.uri()),
        )
        .await
        .unwrap();

    assert_eq!(stored, "/images/movies/logos/603.png");
    let bytes = std::fs::read(h.config.images.cache_dir.join("movies/logos/603.png")).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!(img.dimensions(), (300, 100));
    assert!(img.color().has_alpha());
    assert!(img.get_pixel(10, 10).0[3] < 255);
}

#[tokio::test]
async fn cached_image_is_not_downloaded_again() {
    let h = TestHarness::new();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/poster.png"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(image_bytes(300, 450, ImageFormat::Png)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&h);
    let url = format!("{}/p/poster.png", server.uri());
    let first = pipeline
        .process(MediaType::Movie, ImageRole::Poster, "603", &url)
        .await
        .unwrap();
    let second = pipeline
        .process(MediaType::Movie, ImageRole::Poster, "603", &url)
        .await
        .unwrap();

    assert_eq!(first, second);
    server.verify().await;
}

#[tokio::test]
async fn failed_download_falls_back_to_remote_url() {
    let h = TestHarness::new();
    let server = MockServer::start().await;
    serve_png(&server, "/p/poster.png", 400, 600).await;
    Mock::given(method("GET"))
        .and(path("/p/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let poster_url = format!("{}/p/poster.png", server.uri());
    let missing_url = format!("{}/p/missing.png", server.uri());
    let processed = pipeline(&h)
        .process_all(
            MediaType::Movie,
            "603",
            &[
                (ImageRole::Poster, Some(poster_url)),
                (ImageRole::Backdrop, Some(missing_url.clone())),
                (ImageRole::Logo, None),
            ],
        )
        .await;

    assert_eq!(processed.len(), 3);
    assert_eq!(
        processed[0].path.as_deref(),
        Some("/images/movies/posters/603.jpg")
    );
    assert_eq!(processed[1].path.as_deref(), Some(missing_url.as_str()));
    assert_eq!(processed[2].path, None);
    assert!(!h
        .config
        .images
        .cache_dir
        .join("movies/backdrops/603.jpg")
        .exists());
}

#[tokio::test]
async fn fetched_artwork_is_cached_and_recorded() {
    let h = TestHarness::new();
    let server = MockServer::start().await;
    serve_png(&server, "/p/poster.png", 800, 1200).await;
    serve_png(&server, "/p/logo.png", 400, 100).await;

    let library = h.create_library();
    let record = h.create_media(library, "The Matrix");
    let provider = StubProvider::new(StubReply::Found(MediaMetadataResult {
        source_id: "603".into(),
        title: "The Matrix".into(),
        overview: Some("A hacker learns the truth.".into()),
        poster_url: Some(format!("{}/p/poster.png", server.uri())),
        logo_url: Some(format!("{}/p/logo.png", server.uri())),
        ..Default::default()
    }));
    let processor = h.processor(provider.clone());
    let job = h.job_for(&record, None);

    assert_eq!(processor.handle(&job).await, JobOutcome::Success);

    let updated = h.get_media(&record).unwrap();
    assert_eq!(
        updated.poster_path.as_deref(),
        Some("/images/movies/posters/603.jpg")
    );
    assert_eq!(
        updated.logo_path.as_deref(),
        Some("/images/movies/logos/603.png")
    );
    assert!(updated.backdrop_path.is_none());

    // Second delivery of the same job is now a no-op.
    assert_eq!(processor.handle(&job).await, JobOutcome::Skipped);
    assert_eq!(provider.calls(), 1);
}
