use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub images: ImageConfig,
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Which store backs the job queue.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Shared Redis lists; survives restarts and is visible to producers.
    #[default]
    Redis,
    /// In-process lists. Single process only, lost on exit.
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,

    /// Queue name; the processing list is `{name}:processing`.
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Number of concurrent workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retries before a job is dropped as exhausted.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base; attempt `n` waits `base * 2^(n-1)`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_claim_timeout")]
    pub claim_timeout_secs: u64,

    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,

    #[serde(default = "default_recovery_max_items")]
    pub recovery_max_items: usize,

    #[serde(default = "default_recovery_time_budget")]
    pub recovery_time_budget_secs: u64,
}

fn default_queue_name() -> String {
    "metadata".to_string()
}
fn default_concurrency() -> usize {
    4
}
fn default_max_retries() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    5000
}
fn default_claim_timeout() -> u64 {
    1
}
fn default_reconnect_interval() -> u64 {
    5
}
fn default_recovery_max_items() -> usize {
    10_000
}
fn default_recovery_time_budget() -> u64 {
    30
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            name: default_queue_name(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            claim_timeout_secs: default_claim_timeout(),
            reconnect_interval_secs: default_reconnect_interval(),
            recovery_max_items: default_recovery_max_items(),
            recovery_time_budget_secs: default_recovery_time_budget(),
        }
    }
}

impl QueueConfig {
    pub fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_timeout_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn recovery_time_budget(&self) -> Duration {
        Duration::from_secs(self.recovery_time_budget_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("marquee.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Metadata provider selected at startup.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Tmdb,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    /// Upper bound on a single provider lookup.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default)]
    pub tmdb: TmdbConfig,
}

fn default_fetch_timeout() -> u64 {
    60
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            fetch_timeout_secs: default_fetch_timeout(),
            tmdb: TmdbConfig::default(),
        }
    }
}

impl MetadataConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TmdbConfig {
    #[serde(default)]
    pub api_key: String,

    /// Preferred language for titles, overviews and logos.
    #[serde(default = "default_language")]
    pub language: String,

    /// Override for the API root, mostly useful for testing.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Override for the image CDN root.
    #[serde(default)]
    pub image_base_url: Option<String>,
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            language: default_language(),
            base_url: None,
            image_base_url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageConfig {
    /// Root directory of the local artwork cache.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Prefix of stored paths that refer to the local cache.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data/images")
}
fn default_url_prefix() -> String {
    "/images/".to_string()
}
fn default_download_timeout() -> u64 {
    30
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            url_prefix: default_url_prefix(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

impl ImageConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}
