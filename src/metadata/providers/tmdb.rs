//! TMDB (The Movie Database) metadata provider.
//!
//! Implements [`MetadataProvider`] by querying the TMDB v3 REST API.
//!
//! Features:
//! - Token-bucket rate limiting at 4 requests / second via [`governor`].
//! - Automatic retry on HTTP 429 with `Retry-After` header support (max 3 retries).
//! - 30-second request timeout.
//! - Confidence scoring based on title similarity and year proximity.
//! - One details request per item, with artwork appended via
//!   `append_to_response=images`.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use marquee_common::MediaType;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::TmdbConfig;
use crate::metadata::provider::{MediaMetadataResult, MetadataProvider};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/original";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const REQUESTS_PER_SECOND: u32 = 4;

// ---------------------------------------------------------------------------
// TMDB API response types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TmdbSearchResponse {
    results: Vec<TmdbSearchResult>,
}

/// Movie and TV search results share a shape apart from the title/date keys.
#[derive(Debug, Deserialize)]
struct TmdbSearchResult {
    id: u64,
    #[serde(alias = "name")]
    title: Option<String>,
    #[serde(alias = "first_air_date")]
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbDetail {
    id: u64,
    #[serde(alias = "name")]
    title: Option<String>,
    overview: Option<String>,
    #[serde(alias = "first_air_date")]
    release_date: Option<String>,
    vote_average: Option<f64>,
    genres: Option<Vec<TmdbGenre>>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    images: Option<TmdbImagesResponse>,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct TmdbImagesResponse {
    #[serde(default)]
    posters: Vec<TmdbImage>,
    #[serde(default)]
    backdrops: Vec<TmdbImage>,
    #[serde(default)]
    logos: Vec<TmdbImage>,
}

#[derive(Debug, Deserialize)]
struct TmdbImage {
    file_path: String,
    iso_639_1: Option<String>,
    #[serde(default)]
    vote_average: f64,
}

// ---------------------------------------------------------------------------
// Provider implementation
// ---------------------------------------------------------------------------

/// TMDB metadata provider.
///
/// Wraps the TMDB v3 REST API with built-in rate limiting, retry logic, and
/// confidence-scored search results.
///
/// # Examples
///
/// ```no_run
/// use marquee::metadata::providers::TmdbProvider;
///
/// let provider = TmdbProvider::new("your-api-key".into(), "en-US".into()).unwrap();
/// ```
pub struct TmdbProvider {
    client: reqwest::Client,
    api_key: String,
    language: String,
    base_url: String,
    image_base_url: String,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl TmdbProvider {
    /// Create a new TMDB provider with the given API key and language.
    ///
    /// The `language` parameter should be a language tag such as `"en-US"`.
    pub fn new(api_key: String, language: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build TMDB HTTP client")?;

        let rate = NonZeroU32::new(REQUESTS_PER_SECOND).context("rate limit must be non-zero")?;
        let quota = Quota::per_second(rate);
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            api_key,
            language,
            base_url: TMDB_BASE_URL.to_string(),
            image_base_url: TMDB_IMAGE_BASE.to_string(),
            rate_limiter,
        })
    }

    pub fn from_config(config: &TmdbConfig) -> anyhow::Result<Self> {
        let mut provider = Self::new(config.api_key.clone(), config.language.clone())?;
        if let Some(ref base) = config.base_url {
            provider.base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(ref base) = config.image_base_url {
            provider.image_base_url = base.trim_end_matches('/').to_string();
        }
        Ok(provider)
    }

    pub fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Execute a GET request with rate limiting and 429-retry logic.
    async fn get(&self, url: &str) -> anyhow::Result<reqwest::Response> {
        let mut retries = 0u32;
        loop {
            self.rate_limiter.until_ready().await;

            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(reqwest::Error::without_url)
                .with_context(|| format!("TMDB request failed: {}", self.redact(url)))?;

            if resp.status() == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RETRIES {
                retries += 1;
                let wait = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                warn!(
                    retry = retries,
                    wait_secs = wait,
                    "TMDB returned 429, backing off"
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            let resp = resp
                .error_for_status()
                .map_err(reqwest::Error::without_url)
                .with_context(|| format!("TMDB request returned error: {}", self.redact(url)))?;

            return Ok(resp);
        }
    }

    /// Build a full API URL with the API key and language query parameters.
    fn url(&self, path: &str, extra_params: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}{path}?api_key={}&language={}",
            self.base_url,
            urlencoded(&self.api_key),
            urlencoded(&self.language)
        );
        for (key, value) in extra_params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoded(value));
        }
        url
    }

    /// Strip the API key from URLs before they reach logs or errors.
    fn redact(&self, url: &str) -> String {
        if self.api_key.is_empty() {
            url.to_string()
        } else {
            url.replace(&urlencoded(&self.api_key), "***")
        }
    }

    /// Two-letter language prefix used to filter artwork, e.g. `"en"`.
    fn image_language(&self) -> &str {
        self.language.split('-').next().unwrap_or("en")
    }

    fn image_url(&self, path: &str) -> String {
        format!("{}{path}", self.image_base_url)
    }

    /// Compute confidence score for a search result based on title similarity
    /// and year proximity.
    fn confidence(
        query_title: &str,
        result_title: &str,
        query_year: Option<u16>,
        result_year: Option<u16>,
    ) -> f64 {
        let base = if query_title == result_title {
            0.5
        } else if query_title.eq_ignore_ascii_case(result_title) {
            0.4
        } else if result_title
            .to_ascii_lowercase()
            .contains(&query_title.to_ascii_lowercase())
        {
            0.2
        } else {
            0.1
        };

        let year_bonus = match (query_year, result_year) {
            (Some(q), Some(r)) if q == r => 0.3,
            (Some(q), Some(r)) if q.abs_diff(r) <= 1 => 0.15,
            _ => 0.0,
        };

        base + year_bonus
    }

    /// Search and return the id of the highest-confidence match.
    async fn best_match(
        &self,
        kind: &str,
        title: &str,
        year: Option<u16>,
    ) -> anyhow::Result<Option<u64>> {
        let year_str = year.map(|y| y.to_string());
        let mut params = vec![("query", title)];
        if let Some(ref y) = year_str {
            let key = if kind == "tv" { "first_air_date_year" } else { "year" };
            params.push((key, y.as_str()));
        }

        let url = self.url(&format!("/search/{kind}"), &params);
        debug!(kind, title, ?year, "TMDB search");

        let body: TmdbSearchResponse = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("failed to parse TMDB {kind} search response"))?;

        let best = body
            .results
            .iter()
            .map(|r| {
                let result_title = r.title.as_deref().unwrap_or_default();
                let score =
                    Self::confidence(title, result_title, year, parse_year(&r.release_date));
                (r.id, score)
            })
            .fold(None::<(u64, f64)>, |best, (id, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((id, score)),
            });

        Ok(best.map(|(id, _)| id))
    }

    async fn details(&self, kind: &str, id: u64) -> anyhow::Result<TmdbDetail> {
        let image_languages = format!("{},null", self.image_language());
        let url = self.url(
            &format!("/{kind}/{id}"),
            &[
                ("append_to_response", "images"),
                ("include_image_language", image_languages.as_str()),
            ],
        );
        debug!(kind, id, "TMDB get details");

        self.get(&url)
            .await?
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("failed to parse TMDB {kind} detail response"))
    }

    fn to_result(&self, detail: TmdbDetail) -> MediaMetadataResult {
        let images = detail.images.unwrap_or_default();
        let url = |path: &str| self.image_url(path);

        MediaMetadataResult {
            source_id: detail.id.to_string(),
            external_id_source: self.external_id_source(),
            title: detail.title.unwrap_or_default(),
            overview: detail.overview.filter(|o| !o.trim().is_empty()),
            poster_url: detail.poster_path.as_deref().map(url),
            backdrop_url: detail.backdrop_path.as_deref().map(url),
            null_poster_url: first_textless(&images.posters).map(url),
            null_backdrop_url: first_textless(&images.backdrops).map(url),
            logo_url: best_logo(&images.logos, self.image_language()).map(url),
            release_date: detail.release_date.filter(|d| !d.is_empty()),
            rating: detail.vote_average,
            genres: detail
                .genres
                .unwrap_or_default()
                .into_iter()
                .map(|g| g.name)
                .collect(),
        }
    }
}

/// First image without a language, i.e. without text on it.
fn first_textless(images: &[TmdbImage]) -> Option<&str> {
    images
        .iter()
        .find(|img| img.iso_639_1.is_none())
        .map(|img| img.file_path.as_str())
}

/// Highest-voted logo in `language`, falling back to the highest-voted logo.
fn best_logo<'a>(logos: &'a [TmdbImage], language: &str) -> Option<&'a str> {
    highest_voted(
        logos
            .iter()
            .filter(|img| img.iso_639_1.as_deref() == Some(language)),
    )
    .or_else(|| highest_voted(logos.iter()))
}

fn highest_voted<'a>(images: impl Iterator<Item = &'a TmdbImage>) -> Option<&'a str> {
    images
        .max_by(|a, b| {
            a.vote_average
                .partial_cmp(&b.vote_average)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|img| img.file_path.as_str())
}

/// Minimal percent-encoding for query parameter values.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0x0f) as usize]));
            }
        }
    }
    out
}

const HEX: [u8; 16] = *b"0123456789ABCDEF";

/// Extract a four-digit year from a date string like `"2023-04-15"`.
fn parse_year(date: &Option<String>) -> Option<u16> {
    date.as_deref()
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse::<u16>().ok())
}

#[async_trait]
impl MetadataProvider for TmdbProvider {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    async fn fetch_metadata(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: MediaType,
    ) -> anyhow::Result<Option<MediaMetadataResult>> {
        let kind = match media_type {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
            MediaType::Music | MediaType::Comic => {
                debug!(%media_type, "TMDB has no data for this media type");
                return Ok(None);
            }
        };

        let year = year.and_then(|y| u16::try_from(y).ok());
        let Some(id) = self.best_match(kind, title, year).await? else {
            debug!(kind, title, "No TMDB match");
            return Ok(None);
        };

        let detail = self.details(kind, id).await?;
        Ok(Some(self.to_result(detail)))
    }
}
