//! Local artwork cache layout and encoding.
//!
//! Files live at `{cache_dir}/{media_folder}/{role_folder}/{source_id}.{ext}`
//! and are referenced from media records as `{url_prefix}{...same...}`.

use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use marquee_common::{ImageRole, MediaType};

/// JPEG quality used for every lossy role.
pub const JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone)]
pub struct ImageStorage {
    cache_dir: PathBuf,
    url_prefix: String,
}

impl ImageStorage {
    pub fn new(cache_dir: PathBuf, url_prefix: impl Into<String>) -> Self {
        Self {
            cache_dir,
            url_prefix: url_prefix.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Path relative to the cache root, e.g. `movies/posters/603.jpg`.
    pub fn relative_path(&self, media_type: MediaType, role: ImageRole, source_id: &str) -> String {
        format!(
            "{}/{}/{}.{}",
            media_type.folder(),
            role.folder(),
            sanitize_id(source_id),
            role.extension()
        )
    }

    /// Path as stored on the media record.
    pub fn stored_path(&self, media_type: MediaType, role: ImageRole, source_id: &str) -> String {
        format!(
            "{}{}",
            self.url_prefix,
            self.relative_path(media_type, role, source_id)
        )
    }

    /// Absolute location of a cache file.
    pub fn file_path(&self, media_type: MediaType, role: ImageRole, source_id: &str) -> PathBuf {
        self.cache_dir
            .join(self.relative_path(media_type, role, source_id))
    }

    /// Whether a stored path refers to the local cache rather than a remote URL.
    pub fn is_local(&self, stored: &str) -> bool {
        stored.starts_with(&self.url_prefix)
    }

    /// Map a local stored path back to its file. Remote URLs and paths that
    /// would escape the cache directory resolve to `None`.
    pub fn resolve(&self, stored: &str) -> Option<PathBuf> {
        let relative = Path::new(stored.strip_prefix(&self.url_prefix)?);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.cache_dir.join(relative))
    }

    /// A cached file exists and is non-empty.
    pub fn has_valid_file(path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Write bytes through a temporary sibling so readers never see a
    /// partially written file.
    pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
        let dir = path
            .parent()
            .with_context(|| format!("Image path has no parent: {}", path.display()))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create image directory: {}", dir.display()))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid image file name: {}", path.display()))?;
        let tmp = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        std::fs::write(&tmp, data)
            .with_context(|| format!("Failed to write image file: {}", tmp.display()))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e)
                .with_context(|| format!("Failed to move image into place: {}", path.display()));
        }
        Ok(())
    }
}

/// Decode, shrink to the role's maximum width and re-encode.
///
/// Never upscales. Lossless roles keep their alpha channel as PNG, all others
/// become JPEG at [`JPEG_QUALITY`].
pub fn encode_for_role(data: &[u8], role: ImageRole) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data).context("Failed to decode image data")?;

    let max_width = role.max_width();
    let img = if img.width() > max_width {
        img.resize(max_width, u32::MAX, FilterType::Lanczos3)
    } else {
        img
    };

    let mut buf = Vec::new();
    if role.is_lossless() {
        DynamicImage::ImageRgba8(img.to_rgba8())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .context("Failed to encode image as PNG")?;
    } else {
        let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
        DynamicImage::ImageRgb8(img.to_rgb8())
            .write_with_encoder(encoder)
            .context("Failed to encode image as JPEG")?;
    }
    Ok(buf)
}

fn sanitize_id(source_id: &str) -> String {
    let cleaned: String = source_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
