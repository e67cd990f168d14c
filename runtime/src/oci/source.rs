//! Image sources: where run images, previous images and exported images live.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use a3s_pack_core::error::{PackError, Result};
use async_trait::async_trait;

use super::image::OciImage;
use super::layout::{read_layout, write_layout};
use super::store::ImageStore;

/// A named image location the exporter can read from and write to.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Human readable reference of the image.
    fn reference(&self) -> &str;

    /// Load the image.
    async fn fetch(&self) -> Result<OciImage>;

    /// Persist `image` at this location and return its digest.
    async fn write(&self, image: &OciImage) -> Result<String>;

    /// Digest of the image currently at this location.
    async fn digest(&self) -> Result<String> {
        self.fetch().await?.digest()
    }
}

/// An image kept as an OCI layout directory.
#[derive(Debug, Clone)]
pub struct LayoutSource {
    path: PathBuf,
    reference: String,
}

impl LayoutSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let reference = path.display().to_string();
        Self { path, reference }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ImageSource for LayoutSource {
    fn reference(&self) -> &str {
        &self.reference
    }

    async fn fetch(&self) -> Result<OciImage> {
        let path = self.path.clone();
        run_blocking(move || read_layout(&path)).await
    }

    async fn write(&self, image: &OciImage) -> Result<String> {
        let path = self.path.clone();
        let image = image.clone();
        run_blocking(move || write_layout(&image, &path, None)).await
    }
}

/// An image kept by reference in the local [`ImageStore`].
pub struct StoreSource {
    store: Arc<ImageStore>,
    reference: String,
}

impl StoreSource {
    pub fn new(store: Arc<ImageStore>, reference: impl Into<String>) -> Self {
        Self {
            store,
            reference: reference.into(),
        }
    }
}

#[async_trait]
impl ImageSource for StoreSource {
    fn reference(&self) -> &str {
        &self.reference
    }

    async fn fetch(&self) -> Result<OciImage> {
        let stored = self
            .store
            .get(&self.reference)
            .await
            .ok_or_else(|| PackError::Store(format!("Image not found: {}", self.reference)))?;
        run_blocking(move || read_layout(&stored.path)).await
    }

    async fn write(&self, image: &OciImage) -> Result<String> {
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(self.store.store_dir())
            .map_err(|e| PackError::Store(format!("Failed to create staging directory: {}", e)))?;

        let layout_dir = staging.path().join("image");
        let image = image.clone();
        let reference = self.reference.clone();
        let dir = layout_dir.clone();
        let digest = run_blocking(move || write_layout(&image, &dir, Some(&reference))).await?;

        self.store.put(&self.reference, &digest, &layout_dir).await?;
        Ok(digest)
    }

    async fn digest(&self) -> Result<String> {
        self.store
            .get(&self.reference)
            .await
            .map(|stored| stored.digest)
            .ok_or_else(|| PackError::Store(format!("Image not found: {}", self.reference)))
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PackError::OciImage(format!("Image I/O task failed: {}", e)))?
}
