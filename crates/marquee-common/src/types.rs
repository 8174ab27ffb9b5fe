//! Core type definitions for media records, artwork and scan jobs.
//!
//! The enums here are shared by the queue wire format, the database layer and
//! the image storage layout, so each one carries its canonical string form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Kind of media a record (and its library) holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Feature films.
    #[serde(alias = "movies")]
    Movie,
    /// TV series.
    #[serde(alias = "tvshow", alias = "tvshows", alias = "series")]
    Tv,
    /// Music albums.
    Music,
    /// Comics and graphic novels.
    #[serde(alias = "comics")]
    Comic,
}

impl MediaType {
    /// Canonical lowercase name, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
            Self::Music => "music",
            Self::Comic => "comic",
        }
    }

    /// Top-level folder used by the local image storage layout.
    pub fn folder(&self) -> &'static str {
        match self {
            Self::Movie => "movies",
            Self::Tv => "tv",
            Self::Music => "music",
            Self::Comic => "comics",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(Self::Movie),
            "tv" | "tvshow" | "tvshows" | "series" => Ok(Self::Tv),
            "music" => Ok(Self::Music),
            "comic" | "comics" => Ok(Self::Comic),
            other => Err(Error::invalid_input(format!("unknown media type: {other}"))),
        }
    }
}

/// Artwork slot on a media record.
///
/// The `Null*` variants are textless alternates (no language overlay) that
/// some providers publish alongside the regular artwork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageRole {
    /// Primary poster.
    Poster,
    /// Wide background image.
    Backdrop,
    /// Textless poster.
    NullPoster,
    /// Textless backdrop.
    NullBackdrop,
    /// Transparent title logo.
    Logo,
}

impl ImageRole {
    /// Every role, in the order the pipeline reports them.
    pub const ALL: [ImageRole; 5] = [
        ImageRole::Poster,
        ImageRole::Backdrop,
        ImageRole::NullPoster,
        ImageRole::NullBackdrop,
        ImageRole::Logo,
    ];

    /// Folder name under the media type folder.
    pub fn folder(&self) -> &'static str {
        match self {
            Self::Poster => "posters",
            Self::Backdrop => "backdrops",
            Self::NullPoster => "null-posters",
            Self::NullBackdrop => "null-backdrops",
            Self::Logo => "logos",
        }
    }

    /// Maximum stored width in pixels. Images are never upscaled.
    pub fn max_width(&self) -> u32 {
        match self {
            Self::Poster | Self::NullPoster => 500,
            Self::Backdrop | Self::NullBackdrop => 1280,
            Self::Logo => 300,
        }
    }

    /// Whether this role is stored losslessly with transparency.
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Logo)
    }

    /// File extension of the stored encoding.
    pub fn extension(&self) -> &'static str {
        if self.is_lossless() {
            "png"
        } else {
            "jpg"
        }
    }
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Poster => "poster",
            Self::Backdrop => "backdrop",
            Self::NullPoster => "null-poster",
            Self::NullBackdrop => "null-backdrop",
            Self::Logo => "logo",
        };
        f.write_str(name)
    }
}

/// Status of the directory scan half of a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Paused,
}

impl ScanStatus {
    /// Canonical upper-case form, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Paused => "PAUSED",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "PAUSED" => Ok(Self::Paused),
            other => Err(Error::invalid_input(format!("unknown scan status: {other}"))),
        }
    }
}

/// Status of the metadata enrichment half of a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataStatus {
    NotStarted,
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl MetadataStatus {
    /// Canonical upper-case form, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for MetadataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_STARTED" => Ok(Self::NotStarted),
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::invalid_input(format!(
                "unknown metadata status: {other}"
            ))),
        }
    }
}
