//! Decide whether a job needs a provider fetch at all.

use std::sync::Arc;

use anyhow::{Context, Result};
use marquee_common::ImageRole;
use marquee_db::models::Media;
use marquee_db::pool::{get_conn, DbPool};
use marquee_db::queries::{external_ids, media};

use crate::images::ImageStorage;
use crate::queue::Job;

#[derive(Debug)]
pub enum Validation {
    /// The media record no longer exists.
    MediaNotFound,
    /// Metadata, external id and cached artwork are all in place.
    AlreadySatisfied,
    NeedsFetch(Box<Media>),
}

pub struct MetadataValidator {
    pool: DbPool,
    storage: Arc<ImageStorage>,
}

impl MetadataValidator {
    pub fn new(pool: DbPool, storage: Arc<ImageStorage>) -> Self {
        Self { pool, storage }
    }

    /// Check, in order: the record exists; unless `rescan`, it has core
    /// metadata, an id from `external_id_source`, and its locally stored
    /// poster/backdrop files are present and non-empty.
    pub fn validate(&self, job: &Job, external_id_source: &str) -> Result<Validation> {
        let conn = get_conn(&self.pool).context("Failed to get database connection")?;

        let Some(record) = media::get_media(&conn, job.media_id)
            .with_context(|| format!("Failed to load media {}", job.media_id))?
        else {
            return Ok(Validation::MediaNotFound);
        };

        if job.rescan || !record.has_core_metadata() {
            return Ok(Validation::NeedsFetch(Box::new(record)));
        }

        let linked = external_ids::has_external_id(&conn, record.id, external_id_source)
            .context("Failed to check external ids")?;
        drop(conn);

        if linked && self.local_artwork_intact(&record) {
            Ok(Validation::AlreadySatisfied)
        } else {
            Ok(Validation::NeedsFetch(Box::new(record)))
        }
    }

    fn local_artwork_intact(&self, record: &Media) -> bool {
        [ImageRole::Poster, ImageRole::Backdrop]
            .into_iter()
            .filter_map(|role| record.image_path(role))
            .filter(|path| self.storage.is_local(path))
            .all(|path| {
                self.storage
                    .resolve(path)
                    .is_some_and(|file| ImageStorage::has_valid_file(&file))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use marquee_common::MediaType;
    use marquee_db::models::{MetadataUpdate, NewMedia};
    use marquee_db::pool::init_memory_pool;
    use marquee_db::queries::libraries::create_library;

    struct Fixture {
        _dir: tempfile::TempDir,
        pool: DbPool,
        storage: Arc<ImageStorage>,
        job: Job,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_memory_pool().unwrap();
        let storage = Arc::new(ImageStorage::new(dir.path().to_path_buf(), "/images/"));

        let conn = get_conn(&pool).unwrap();
        let library = create_library(&conn, "Films", MediaType::Movie).unwrap();
        let record = media::insert_media(
            &conn,
            &NewMedia {
                library_id: library.id,
                media_type: MediaType::Movie,
                title: "Heat".into(),
                year: Some(1995),
                folder_path: None,
                filename: None,
            },
        )
        .unwrap();
        let job = Job::new(record.id, library.id, "Heat", MediaType::Movie);
        drop(conn);

        Fixture {
            _dir: dir,
            pool,
            storage,
            job,
        }
    }

    fn enrich(f: &Fixture, poster: &str) {
        let conn = get_conn(&f.pool).unwrap();
        media::update_metadata(
            &conn,
            f.job.media_id,
            &MetadataUpdate {
                title: "Heat".into(),
                overview: Some("A group of professional bank robbers...".into()),
                poster_path: Some(poster.into()),
                ..Default::default()
            },
        )
        .unwrap();
        external_ids::upsert_external_id(&conn, f.job.media_id, "TMDB", "949").unwrap();
    }

    #[test]
    fn missing_media() {
        let f = fixture();
        let mut job = f.job.clone();
        job.media_id = marquee_common::MediaId::new();

        let validator = MetadataValidator::new(f.pool.clone(), f.storage.clone());
        assert_matches!(validator.validate(&job, "TMDB").unwrap(), Validation::MediaNotFound);
    }

    #[test]
    fn bare_record_needs_fetch() {
        let f = fixture();
        let validator = MetadataValidator::new(f.pool.clone(), f.storage.clone());
        assert_matches!(
            validator.validate(&f.job, "TMDB").unwrap(),
            Validation::NeedsFetch(_)
        );
    }

    #[test]
    fn complete_record_with_cached_file_is_satisfied() {
        let f = fixture();
        enrich(&f, "/images/movies/posters/949.jpg");
        ImageStorage::write_atomic(&f.storage.cache_dir().join("movies/posters/949.jpg"), b"jpg")
            .unwrap();

        let validator = MetadataValidator::new(f.pool.clone(), f.storage.clone());
        assert_matches!(
            validator.validate(&f.job, "TMDB").unwrap(),
            Validation::AlreadySatisfied
        );
    }

    #[test]
    fn remote_artwork_is_not_checked_on_disk() {
        let f = fixture();
        enrich(&f, "https://image.tmdb.org/t/p/original/poster.jpg");

        let validator = MetadataValidator::new(f.pool.clone(), f.storage.clone());
        assert_matches!(
            validator.validate(&f.job, "TMDB").unwrap(),
            Validation::AlreadySatisfied
        );
    }

    #[test]
    fn missing_cached_file_needs_fetch() {
        let f = fixture();
        enrich(&f, "/images/movies/posters/949.jpg");

        let validator = MetadataValidator::new(f.pool.clone(), f.storage.clone());
        assert_matches!(
            validator.validate(&f.job, "TMDB").unwrap(),
            Validation::NeedsFetch(_)
        );
    }

    #[test]
    fn other_provider_needs_fetch() {
        let f = fixture();
        enrich(&f, "https://image.tmdb.org/t/p/original/poster.jpg");

        let validator = MetadataValidator::new(f.pool.clone(), f.storage.clone());
        assert_matches!(
            validator.validate(&f.job, "TVDB").unwrap(),
            Validation::NeedsFetch(_)
        );
    }

    #[test]
    fn rescan_forces_fetch() {
        let f = fixture();
        enrich(&f, "https://image.tmdb.org/t/p/original/poster.jpg");
        let mut job = f.job.clone();
        job.rescan = true;

        let validator = MetadataValidator::new(f.pool.clone(), f.storage.clone());
        assert_matches!(
            validator.validate(&job, "TMDB").unwrap(),
            Validation::NeedsFetch(_)
        );
    }
}
