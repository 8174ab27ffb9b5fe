//! Trait definition and result type for metadata providers.
//!
//! A provider wraps one external source (TMDB, ...) and answers a single
//! question: given a title, optional year and media type, what is the
//! canonical metadata and artwork for it?

use async_trait::async_trait;
use marquee_common::{ImageRole, MediaType};
use serde::{Deserialize, Serialize};

/// Normalised metadata for one media item, as returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadataResult {
    /// Provider-specific identifier (e.g. TMDB numeric ID).
    pub source_id: String,
    /// Tag the external id is stored under, e.g. `"TMDB"`.
    pub external_id_source: String,
    pub title: String,
    pub overview: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    /// Textless poster, if the provider has one.
    pub null_poster_url: Option<String>,
    /// Textless backdrop, if the provider has one.
    pub null_backdrop_url: Option<String>,
    pub logo_url: Option<String>,
    /// ISO-8601 date (YYYY-MM-DD).
    pub release_date: Option<String>,
    /// Community rating, typically 0.0 - 10.0.
    pub rating: Option<f64>,
    pub genres: Vec<String>,
}

impl MediaMetadataResult {
    pub fn image(&self, role: ImageRole) -> Option<&str> {
        match role {
            ImageRole::Poster => self.poster_url.as_deref(),
            ImageRole::Backdrop => self.backdrop_url.as_deref(),
            ImageRole::NullPoster => self.null_poster_url.as_deref(),
            ImageRole::NullBackdrop => self.null_backdrop_url.as_deref(),
            ImageRole::Logo => self.logo_url.as_deref(),
        }
    }

    pub fn set_image(&mut self, role: ImageRole, value: Option<String>) {
        let slot = match role {
            ImageRole::Poster => &mut self.poster_url,
            ImageRole::Backdrop => &mut self.backdrop_url,
            ImageRole::NullPoster => &mut self.null_poster_url,
            ImageRole::NullBackdrop => &mut self.null_backdrop_url,
            ImageRole::Logo => &mut self.logo_url,
        };
        *slot = value;
    }
}

/// Async trait that all metadata providers must implement.
///
/// Calls cross a network boundary and must be treated as failable. `Ok(None)`
/// means the provider has no match for the query.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Short, lowercase identifier for this provider (e.g. `"tmdb"`).
    fn name(&self) -> &'static str;

    /// Source tag under which external ids from this provider are stored.
    fn external_id_source(&self) -> String {
        self.name().to_ascii_uppercase()
    }

    async fn fetch_metadata(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
    ) -> anyhow::Result<Option<MediaMetadataResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named;

    #[async_trait]
    impl MetadataProvider for Named {
        fn name(&self) -> &'static str {
            "fanart"
        }

        async fn fetch_metadata(
            &self,
            _title: &str,
            _year: Option<i32>,
            _media_type: MediaType,
        ) -> anyhow::Result<Option<MediaMetadataResult>> {
            Ok(None)
        }
    }

    #[test]
    fn default_external_id_source_is_upper_name() {
        assert_eq!(Named.external_id_source(), "FANART");
    }

    #[test]
    fn image_slots() {
        let mut result = MediaMetadataResult::default();
        result.set_image(ImageRole::NullBackdrop, Some("x".into()));
        assert_eq!(result.image(ImageRole::NullBackdrop), Some("x"));
        assert_eq!(result.null_backdrop_url.as_deref(), Some("x"));
        assert_eq!(result.image(ImageRole::Backdrop), None);
    }
}
