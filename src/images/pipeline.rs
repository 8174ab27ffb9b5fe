//! Download and normalise provider artwork into the local cache.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use marquee_common::{ImageRole, MediaType};

use super::storage::{encode_for_role, ImageStorage};

/// Stored location of one artwork role after processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub role: ImageRole,
    /// Local stored path, or the source URL when local processing failed.
    /// `None` when the provider had no image for this role.
    pub path: Option<String>,
}

pub struct ImagePipeline {
    client: reqwest::Client,
    storage: Arc<ImageStorage>,
}

impl ImagePipeline {
    pub fn new(storage: Arc<ImageStorage>, download_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .user_agent(concat!("marquee/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build image HTTP client")?;
        Ok(Self { client, storage })
    }

    pub fn storage(&self) -> &ImageStorage {
        &self.storage
    }

    /// Process every role concurrently. A role that fails locally falls back
    /// to its remote URL so the record still points somewhere useful.
    pub async fn process_all(
        &self,
        media_type: MediaType,
        source_id: &str,
        sources: &[(ImageRole, Option<String>)],
    ) -> Vec<ProcessedImage> {
        let tasks = sources.iter().map(|(role, url)| async move {
            let path = match url.as_deref() {
                None => None,
                Some(url) => match self.process(media_type, *role, source_id, url).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        tracing::warn!(
                            role = %role,
                            url,
                            error = ?e,
                            "Image processing failed; keeping remote URL"
                        );
                        Some(url.to_string())
                    }
                },
            };
            ProcessedImage { role: *role, path }
        });

        join_all(tasks).await
    }

    /// Fetch one image into the cache and return its stored path.
    ///
    /// Skips the download when a non-empty file already exists for this
    /// media type, role and source id.
    pub async fn process(
        &self,
        media_type: MediaType,
        role: ImageRole,
        source_id: &str,
        url: &str,
    ) -> Result<String> {
        let stored = self.storage.stored_path(media_type, role, source_id);
        let file = self.storage.file_path(media_type, role, source_id);

        if ImageStorage::has_valid_file(&file) {
            tracing::debug!(role = %role, path = %stored, "Image already cached");
            return Ok(stored);
        }

        let data = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download image from {}", url))?
            .error_for_status()
            .with_context(|| format!("HTTP error downloading image from {}", url))?
            .bytes()
            .await
            .with_context(|| format!("Failed to read image bytes from {}", url))?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let encoded = encode_for_role(&data, role)?;
            ImageStorage::write_atomic(&file, &encoded)
        })
        .await
        .context("Image encoding task panicked")??;

        tracing::debug!(role = %role, path = %stored, "Stored image");
        Ok(stored)
    }
}
