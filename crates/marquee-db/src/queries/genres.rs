//! Genre queries and media/genre associations.

use marquee_common::{Error, MediaId, Result};
use rusqlite::Connection;

use crate::models::Genre;

/// Normalise a genre name into its slug (`"Science Fiction"` → `"science-fiction"`).
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Insert a genre if its slug is new and return its ID.
///
/// Returns `None` for names that slugify to nothing (punctuation only).
pub fn upsert_genre(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Ok(None);
    }

    conn.execute(
        "INSERT INTO genres (name, slug) VALUES (?1, ?2) ON CONFLICT(slug) DO NOTHING",
        rusqlite::params![name.trim(), &slug],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    conn.query_row("SELECT id FROM genres WHERE slug = ?1", [&slug], |row| {
        row.get(0)
    })
    .map(Some)
    .map_err(|e| Error::database(e.to_string()))
}

/// Replace the genre set of a media record.
pub fn set_media_genres(conn: &Connection, media_id: MediaId, genre_ids: &[i64]) -> Result<()> {
    conn.execute(
        "DELETE FROM media_genres WHERE media_id = ?1",
        [media_id.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let mut stmt = conn
        .prepare("INSERT OR IGNORE INTO media_genres (media_id, genre_id) VALUES (?1, ?2)")
        .map_err(|e| Error::database(e.to_string()))?;
    for genre_id in genre_ids {
        stmt.execute(rusqlite::params![media_id.to_string(), genre_id])
            .map_err(|e| Error::database(e.to_string()))?;
    }
    Ok(())
}

/// List the genres linked to a media record, ordered by name.
pub fn list_media_genres(conn: &Connection, media_id: MediaId) -> Result<Vec<Genre>> {
    let mut stmt = conn
        .prepare(
            "SELECT g.id, g.name, g.slug FROM genres g
             JOIN media_genres mg ON mg.genre_id = g.id
             WHERE mg.media_id = ?1 ORDER BY g.name",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([media_id.to_string()], Genre::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMedia;
    use crate::pool::{get_conn, init_memory_pool};
    use crate::queries::{libraries, media};
    use marquee_common::MediaType;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Science Fiction"), "science-fiction");
        assert_eq!(slugify("  Action & Adventure "), "action-adventure");
        assert_eq!(slugify("Sci-Fi"), "sci-fi");
        assert_eq!(slugify("TV Movie"), "tv-movie");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_upsert_genre_dedupes_by_slug() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let a = upsert_genre(&conn, "Science Fiction").unwrap().unwrap();
        let b = upsert_genre(&conn, "science  fiction").unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(upsert_genre(&conn, "--").unwrap(), None);
    }

    #[test]
    fn test_set_media_genres_replaces_set() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let library = libraries::create_library(&conn, "Films", MediaType::Movie).unwrap();
        let m = media::insert_media(
            &conn,
            &NewMedia {
                library_id: library.id,
                media_type: MediaType::Movie,
                title: "Alien".into(),
                year: Some(1979),
                folder_path: None,
                filename: None,
            },
        )
        .unwrap();

        let horror = upsert_genre(&conn, "Horror").unwrap().unwrap();
        let scifi = upsert_genre(&conn, "Science Fiction").unwrap().unwrap();
        let thriller = upsert_genre(&conn, "Thriller").unwrap().unwrap();

        set_media_genres(&conn, m.id, &[horror, scifi]).unwrap();
        set_media_genres(&conn, m.id, &[scifi, thriller, thriller]).unwrap();

        let names: Vec<_> = list_media_genres(&conn, m.id)
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["Science Fiction", "Thriller"]);
    }
}
