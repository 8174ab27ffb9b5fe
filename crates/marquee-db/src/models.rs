//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`. Column order is defined by the `COLS` constant of the
//! matching query module.

use std::str::FromStr;

use marquee_common::{
    ImageRole, LibraryId, MediaId, MediaType, MetadataStatus, ScanJobId, ScanStatus,
};
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))?;
    Ok(T::from(uuid))
}

/// Parse a string-encoded enum from a text column.
fn parse_enum<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = marquee_common::Error>,
{
    let s: String = row.get(idx)?;
    s.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub media_type: MediaType,
    pub created_at: String,
}

impl Library {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            name: row.get(1)?,
            media_type: parse_enum(row, 2)?,
            created_at: row.get(3)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

/// A catalogued media record and its enrichment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    pub library_id: LibraryId,
    pub media_type: MediaType,
    pub title: String,
    pub year: Option<i32>,
    pub folder_path: Option<String>,
    pub filename: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub null_poster_path: Option<String>,
    pub null_backdrop_path: Option<String>,
    pub logo_path: Option<String>,
    pub release_date: Option<String>,
    pub rating: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Media {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            library_id: parse_id(row, 1)?,
            media_type: parse_enum(row, 2)?,
            title: row.get(3)?,
            year: row.get(4)?,
            folder_path: row.get(5)?,
            filename: row.get(6)?,
            overview: row.get(7)?,
            poster_path: row.get(8)?,
            backdrop_path: row.get(9)?,
            null_poster_path: row.get(10)?,
            null_backdrop_path: row.get(11)?,
            logo_path: row.get(12)?,
            release_date: row.get(13)?,
            rating: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    /// Stored path for an artwork role, if any.
    pub fn image_path(&self, role: ImageRole) -> Option<&str> {
        match role {
            ImageRole::Poster => self.poster_path.as_deref(),
            ImageRole::Backdrop => self.backdrop_path.as_deref(),
            ImageRole::NullPoster => self.null_poster_path.as_deref(),
            ImageRole::NullBackdrop => self.null_backdrop_path.as_deref(),
            ImageRole::Logo => self.logo_path.as_deref(),
        }
    }

    /// Title, overview and at least one of poster/backdrop are present.
    pub fn has_core_metadata(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        !self.title.trim().is_empty()
            && present(&self.overview)
            && (present(&self.poster_path) || present(&self.backdrop_path))
    }
}

/// Fields required to catalogue a new media record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMedia {
    pub library_id: LibraryId,
    pub media_type: MediaType,
    pub title: String,
    pub year: Option<i32>,
    pub folder_path: Option<String>,
    pub filename: Option<String>,
}

/// Enriched fields written by the metadata pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub null_poster_path: Option<String>,
    pub null_backdrop_path: Option<String>,
    pub logo_path: Option<String>,
    pub release_date: Option<String>,
    pub rating: Option<f64>,
}

// ---------------------------------------------------------------------------
// External IDs and genres
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalId {
    pub media_id: MediaId,
    pub source: String,
    pub external_id: String,
    pub updated_at: String,
}

impl ExternalId {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            media_id: parse_id(row, 0)?,
            source: row.get(1)?,
            external_id: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

impl Genre {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Scan jobs
// ---------------------------------------------------------------------------

/// Aggregate state of one library scan and the metadata jobs it spawned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: ScanJobId,
    pub library_id: LibraryId,
    pub scan_status: ScanStatus,
    pub metadata_status: MetadataStatus,
    pub scanned_count: i64,
    pub metadata_success_count: i64,
    pub metadata_failed_count: i64,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub metadata_started_at: Option<String>,
    pub metadata_completed_at: Option<String>,
    pub created_at: String,
}

impl ScanJob {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            library_id: parse_id(row, 1)?,
            scan_status: parse_enum(row, 2)?,
            metadata_status: parse_enum(row, 3)?,
            scanned_count: row.get(4)?,
            metadata_success_count: row.get(5)?,
            metadata_failed_count: row.get(6)?,
            started_at: row.get(7)?,
            completed_at: row.get(8)?,
            metadata_started_at: row.get(9)?,
            metadata_completed_at: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    /// Number of metadata jobs that reached an outcome.
    pub fn processed_count(&self) -> i64 {
        self.metadata_success_count + self.metadata_failed_count
    }
}
