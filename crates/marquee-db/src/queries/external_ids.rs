//! External (provider) identifier queries.

use chrono::Utc;
use marquee_common::{Error, MediaId, Result};
use rusqlite::Connection;

use crate::models::ExternalId;

/// Link a provider identifier to a media record.
///
/// Keyed by `(source, external_id)`: an identifier that was previously linked
/// to another record moves to `media_id`. Any other identifier the record held
/// for the same source is replaced, so a rescan that resolves to a different
/// provider entry does not leave a stale link behind.
pub fn upsert_external_id(
    conn: &Connection,
    media_id: MediaId,
    source: &str,
    external_id: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "DELETE FROM external_ids WHERE media_id = ?1 AND source = ?2 AND external_id != ?3",
        rusqlite::params![media_id.to_string(), source, external_id],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    conn.execute(
        "INSERT INTO external_ids (media_id, source, external_id, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(source, external_id) DO UPDATE SET
            media_id = excluded.media_id,
            updated_at = excluded.updated_at",
        rusqlite::params![media_id.to_string(), source, external_id, &now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Whether the record has at least one identifier from `source`.
pub fn has_external_id(conn: &Connection, media_id: MediaId, source: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM external_ids WHERE media_id = ?1 AND source = ?2)",
        rusqlite::params![media_id.to_string(), source],
        |row| row.get::<_, bool>(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// List every identifier linked to a record.
pub fn list_for_media(conn: &Connection, media_id: MediaId) -> Result<Vec<ExternalId>> {
    let mut stmt = conn
        .prepare(
            "SELECT media_id, source, external_id, updated_at
             FROM external_ids WHERE media_id = ?1 ORDER BY source",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([media_id.to_string()], ExternalId::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
