//! Concrete metadata provider implementations.
//!
//! Each submodule wraps a single external API and implements the
//! [`MetadataProvider`](super::MetadataProvider) trait.

pub mod tmdb;

pub use tmdb::TmdbProvider;

use std::sync::Arc;

use crate::config::{MetadataConfig, ProviderKind};

use super::MetadataProvider;

/// Build the provider selected in configuration.
pub fn build_provider(config: &MetadataConfig) -> anyhow::Result<Arc<dyn MetadataProvider>> {
    match config.provider {
        ProviderKind::Tmdb => {
            let provider = TmdbProvider::from_config(&config.tmdb)?;
            if !provider.is_available() {
                anyhow::bail!("TMDB provider selected but metadata.tmdb.api_key is empty");
            }
            Ok(Arc::new(provider))
        }
    }
}
