mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content)?;

    config.images.cache_dir = expand_path(&config.images.cache_dir);
    config.database.path = expand_path(&config.database.path);

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./marquee.toml",
        "./config.toml",
        "~/.config/marquee/config.toml",
        "/etc/marquee/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

fn expand_path(path: &Path) -> std::path::PathBuf {
    let raw = path.to_string_lossy();
    std::path::PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let queue = &config.queue;

    if queue.name.trim().is_empty() {
        anyhow::bail!("Queue name cannot be empty");
    }
    if !(1..=32).contains(&queue.concurrency) {
        anyhow::bail!(
            "Queue concurrency must be between 1 and 32, got {}",
            queue.concurrency
        );
    }
    if queue.base_delay_ms == 0 {
        anyhow::bail!("Queue base_delay_ms must be greater than 0");
    }
    if queue.claim_timeout_secs == 0 {
        anyhow::bail!("Queue claim_timeout_secs must be greater than 0");
    }

    let prefix = &config.images.url_prefix;
    if !prefix.starts_with('/') || !prefix.ends_with('/') {
        anyhow::bail!("Image url_prefix must start and end with '/', got {prefix:?}");
    }

    if config.metadata.fetch_timeout_secs == 0 {
        anyhow::bail!("Metadata fetch_timeout_secs must be greater than 0");
    }

    match config.metadata.provider {
        ProviderKind::Tmdb => {
            if config.metadata.tmdb.api_key.is_empty() {
                tracing::warn!("TMDB provider selected but no API key configured");
            }
        }
    }

    Ok(())
}
