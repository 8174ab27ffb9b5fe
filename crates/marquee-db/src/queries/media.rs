//! Media record queries.

use chrono::Utc;
use marquee_common::{Error, MediaId, Result};
use rusqlite::Connection;

use crate::models::{Media, MetadataUpdate, NewMedia};

const COLS: &str = "id, library_id, media_type, title, year, folder_path, filename,
    overview, poster_path, backdrop_path, null_poster_path, null_backdrop_path,
    logo_path, release_date, rating, created_at, updated_at";

/// Catalogue a new media record.
pub fn insert_media(conn: &Connection, new: &NewMedia) -> Result<Media> {
    let id = MediaId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO media (id, library_id, media_type, title, year, folder_path, filename,
                            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        rusqlite::params![
            id.to_string(),
            new.library_id.to_string(),
            new.media_type.as_str(),
            &new.title,
            new.year,
            &new.folder_path,
            &new.filename,
            &now,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    get_media(conn, id)?.ok_or_else(|| Error::internal(format!("media {id} vanished after insert")))
}

/// Get a media record by ID.
pub fn get_media(conn: &Connection, id: MediaId) -> Result<Option<Media>> {
    let q = format!("SELECT {COLS} FROM media WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], Media::from_row) {
        Ok(m) => Ok(Some(m)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Check whether a media record exists.
pub fn media_exists(conn: &Connection, id: MediaId) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM media WHERE id = ?1)",
        [id.to_string()],
        |row| row.get::<_, bool>(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Overwrite the enriched fields of a media record.
///
/// Returns `false` when no record matched.
pub fn update_metadata(conn: &Connection, id: MediaId, update: &MetadataUpdate) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media SET
                title = :title,
                overview = :overview,
                poster_path = :poster_path,
                backdrop_path = :backdrop_path,
                null_poster_path = :null_poster_path,
                null_backdrop_path = :null_backdrop_path,
                logo_path = :logo_path,
                release_date = :release_date,
                rating = :rating,
                updated_at = :updated_at
             WHERE id = :id",
            rusqlite::named_params! {
                ":title": &update.title,
                ":overview": &update.overview,
                ":poster_path": &update.poster_path,
                ":backdrop_path": &update.backdrop_path,
                ":null_poster_path": &update.null_poster_path,
                ":null_backdrop_path": &update.null_backdrop_path,
                ":logo_path": &update.logo_path,
                ":release_date": &update.release_date,
                ":rating": update.rating,
                ":updated_at": Utc::now().to_rfc3339(),
                ":id": id.to_string(),
            },
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete a media record. Cascades to external ids and genre links.
pub fn delete_media(conn: &Connection, id: MediaId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM media WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
