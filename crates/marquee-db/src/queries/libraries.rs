//! Library database queries.

use chrono::Utc;
use marquee_common::{Error, LibraryId, MediaType, Result};
use rusqlite::Connection;

use crate::models::Library;

const COLS: &str = "id, name, media_type, created_at";

/// Create a new library.
pub fn create_library(conn: &Connection, name: &str, media_type: MediaType) -> Result<Library> {
    let id = LibraryId::new();
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO libraries (id, name, media_type, created_at)
         VALUES (:id, :name, :media_type, :created_at)",
        rusqlite::named_params! {
            ":id": id.to_string(),
            ":name": name,
            ":media_type": media_type.as_str(),
            ":created_at": &created_at,
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Library {
        id,
        name: name.to_string(),
        media_type,
        created_at,
    })
}

/// Get a library by ID.
pub fn get_library(conn: &Connection, id: LibraryId) -> Result<Option<Library>> {
    let q = format!("SELECT {COLS} FROM libraries WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], Library::from_row) {
        Ok(library) => Ok(Some(library)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}
