//! Storage for uploaded post images
//!
//! Images live under `<media root>/posts_images/` with generated names. The
//! database stores the path relative to the media root, which is also the
//! path under `/media/` the image is served from.

use anyhow::{Context, Result};
use image::ImageFormat;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::config::UploadConfig;

/// Subdirectory of the media root holding post images
pub const POST_IMAGES_DIR: &str = "posts_images";

/// An image received from a form, not yet stored
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Why an upload was refused
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Upload a valid image. The file you uploaded was either not an image or a corrupted image.")]
    InvalidType(String),

    #[error("The file is too large. Maximum size is {max_mb} MB.")]
    TooLarge { max_mb: u64 },

    #[error("The submitted file is empty.")]
    Empty,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Saves and removes images under the media root
pub struct MediaStore {
    config: UploadConfig,
}

impl MediaStore {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    /// Check size and content of an upload without touching the disk.
    ///
    /// The file must start with the signature of an allowed image format,
    /// and that format must be the one the browser declared. Returns the
    /// extension to store it under.
    pub fn check(&self, upload: &ImageUpload) -> Result<&'static str, MediaError> {
        if upload.data.is_empty() {
            return Err(MediaError::Empty);
        }
        if upload.data.len() as u64 > self.config.max_file_size {
            return Err(MediaError::TooLarge {
                max_mb: self.config.max_file_size / 1024 / 1024,
            });
        }

        let Some((mime, ext)) = detect_format(&upload.data) else {
            return Err(MediaError::InvalidType(upload.content_type.clone()));
        };
        if mime != upload.content_type || !self.config.is_type_allowed(mime) {
            return Err(MediaError::InvalidType(upload.content_type.clone()));
        }
        Ok(ext)
    }

    /// Store an image and return its path relative to the media root.
    pub async fn save(&self, upload: &ImageUpload) -> Result<String, MediaError> {
        let ext = self.check(upload)?;

        let dir = self.config.path.join(POST_IMAGES_DIR);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create media directory {}", dir.display()))?;

        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        fs::write(dir.join(&filename), &upload.data)
            .await
            .context("Failed to save image")?;

        let relative = format!("{}/{}", POST_IMAGES_DIR, filename);
        tracing::debug!(
            "Stored image {} ({} bytes) as {}",
            upload.filename,
            upload.data.len(),
            relative
        );
        Ok(relative)
    }

    /// Remove a stored image. Missing files and paths escaping the media
    /// root are ignored.
    pub async fn delete(&self, relative: &str) {
        let Some(path) = self.resolve(relative) else {
            tracing::warn!("Refusing to delete media path {}", relative);
            return;
        };
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to delete image {}: {}", path.display(), e);
            }
        }
    }

    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.config.path.join(relative))
    }
}

/// MIME type and file extension of the image format `data` starts with
fn detect_format(data: &[u8]) -> Option<(&'static str, &'static str)> {
    match image::guess_format(data).ok()? {
        ImageFormat::Png => Some(("image/png", "png")),
        ImageFormat::Jpeg => Some(("image/jpeg", "jpg")),
        ImageFormat::Gif => Some(("image/gif", "gif")),
        ImageFormat::WebP => Some(("image/webp", "webp")),
        ImageFormat::Bmp => Some(("image/bmp", "bmp")),
        _ => None,
    }
}
