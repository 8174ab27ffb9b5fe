//! Transactional write of fetched metadata.

use anyhow::{Context, Result};
use marquee_common::MediaId;
use marquee_db::models::MetadataUpdate;
use marquee_db::pool::{get_conn, DbPool};
use marquee_db::queries::{external_ids, genres, media};

use super::provider::MediaMetadataResult;

pub struct MetadataUpdater {
    pool: DbPool,
}

impl MetadataUpdater {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Persist `result` onto the media record in one transaction.
    ///
    /// Returns `false` (and writes nothing) when the record was deleted after
    /// validation. Any failure rolls the whole write back.
    pub fn apply(
        &self,
        media_id: MediaId,
        fallback_title: &str,
        result: &MediaMetadataResult,
    ) -> Result<bool> {
        let mut conn = get_conn(&self.pool).context("Failed to get database connection")?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        if !media::media_exists(&tx, media_id)? {
            return Ok(false);
        }

        let title = if result.title.trim().is_empty() {
            fallback_title.to_string()
        } else {
            result.title.clone()
        };

        let update = MetadataUpdate {
            title,
            overview: result.overview.clone(),
            poster_path: result.poster_url.clone(),
            backdrop_path: result.backdrop_url.clone(),
            null_poster_path: result.null_poster_url.clone(),
            null_backdrop_path: result.null_backdrop_url.clone(),
            logo_path: result.logo_url.clone(),
            release_date: result.release_date.clone(),
            rating: result.rating,
        };
        media::update_metadata(&tx, media_id, &update)
            .with_context(|| format!("Failed to update media {media_id}"))?;

        if !result.source_id.is_empty() {
            external_ids::upsert_external_id(
                &tx,
                media_id,
                &result.external_id_source,
                &result.source_id,
            )
            .context("Failed to upsert external id")?;
        }

        let mut genre_ids = Vec::with_capacity(result.genres.len());
        for name in &result.genres {
            if let Some(id) = genres::upsert_genre(&tx, name)
                .with_context(|| format!("Failed to upsert genre {name:?}"))?
            {
                genre_ids.push(id);
            }
        }
        genres::set_media_genres(&tx, media_id, &genre_ids)
            .context("Failed to set media genres")?;

        tx.commit().context("Failed to commit metadata update")?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_common::MediaType;
    use marquee_db::models::NewMedia;
    use marquee_db::pool::init_memory_pool;
    use marquee_db::queries::libraries::create_library;

    fn setup() -> (DbPool, MediaId) {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let library = create_library(&conn, "Films", MediaType::Movie).unwrap();
        let record = media::insert_media(
            &conn,
            &NewMedia {
                library_id: library.id,
                media_type: MediaType::Movie,
                title: "heat.1995".into(),
                year: Some(1995),
                folder_path: None,
                filename: None,
            },
        )
        .unwrap();
        drop(conn);
        (pool, record.id)
    }

    fn result() -> MediaMetadataResult {
        MediaMetadataResult {
            source_id: "949".into(),
            external_id_source: "TMDB".into(),
            title: "Heat".into(),
            overview: Some("Obsessive master thief Neil McCauley...".into()),
            poster_url: Some("/images/movies/posters/949.jpg".into()),
            logo_url: Some("https://image.tmdb.org/t/p/original/logo.png".into()),
            release_date: Some("1995-12-15".into()),
            rating: Some(7.9),
            genres: vec!["Crime".into(), "Drama".into(), "Thriller".into(), "???".into()],
            ..Default::default()
        }
    }

    #[test]
    fn writes_everything() {
        let (pool, id) = setup();
        let updater = MetadataUpdater::new(pool.clone());

        assert!(updater.apply(id, "heat.1995", &result()).unwrap());

        let conn = get_conn(&pool).unwrap();
        let record = media::get_media(&conn, id).unwrap().unwrap();
        assert_eq!(record.title, "Heat");
        assert_eq!(record.poster_path.as_deref(), Some("/images/movies/posters/949.jpg"));
        assert_eq!(record.rating, Some(7.9));
        assert!(record.has_core_metadata());
        assert!(external_ids::has_external_id(&conn, id, "TMDB").unwrap());

        let names: Vec<_> = genres::list_media_genres(&conn, id)
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["Crime", "Drama", "Thriller"]);
    }

    #[test]
    fn rescan_replaces_genre_set() {
        let (pool, id) = setup();
        let updater = MetadataUpdater::new(pool.clone());
        updater.apply(id, "heat.1995", &result()).unwrap();

        let mut second = result();
        second.genres = vec!["Action".into(), "crime".into()];
        updater.apply(id, "heat.1995", &second).unwrap();

        let conn = get_conn(&pool).unwrap();
        let slugs: Vec<_> = genres::list_media_genres(&conn, id)
            .unwrap()
            .into_iter()
            .map(|g| g.slug)
            .collect();
        assert_eq!(slugs, vec!["action", "crime"]);
    }

    #[test]
    fn empty_title_keeps_fallback() {
        let (pool, id) = setup();
        let updater = MetadataUpdater::new(pool.clone());
        let mut r = result();
        r.title = String::new();

        updater.apply(id, "Heat (1995)", &r).unwrap();

        let conn = get_conn(&pool).unwrap();
        assert_eq!(media::get_media(&conn, id).unwrap().unwrap().title, "Heat (1995)");
    }

    #[test]
    fn vanished_record_writes_nothing() {
        let (pool, id) = setup();
        media::delete_media(&get_conn(&pool).unwrap(), id).unwrap();

        let updater = MetadataUpdater::new(pool.clone());
        assert!(!updater.apply(id, "heat.1995", &result()).unwrap());

        let conn = get_conn(&pool).unwrap();
        let genre_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM genres", [], |row| row.get(0))
            .unwrap();
        assert_eq!(genre_count, 0);
    }
}
