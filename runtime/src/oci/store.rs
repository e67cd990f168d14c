//! Local image store.
//!
//! Keeps exported images on disk as OCI layouts under `sha256/<digest>/`,
//! addressed by reference through an in-memory index backed by a
//! persistent `index.json` file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use a3s_pack_core::error::{PackError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use walkdir::WalkDir;

/// Metadata for a stored image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredImage {
    /// Image reference string (e.g., "myapp:latest")
    pub reference: String,
    /// Manifest digest (e.g., "sha256:abc123...")
    pub digest: String,
    /// Total size in bytes
    pub size_bytes: u64,
    /// When the reference was last written
    pub stored_at: DateTime<Utc>,
    /// Path to the OCI image layout on disk
    pub path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreIndex {
    images: Vec<StoredImage>,
}

/// Disk-based image store with an in-memory reference index.
pub struct ImageStore {
    store_dir: PathBuf,
    /// reference → StoredImage
    index: Arc<RwLock<HashMap<String, StoredImage>>>,
}

impl ImageStore {
    /// Open (or create) a store rooted at `store_dir`.
    pub fn new(store_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(store_dir).map_err(|e| {
            PackError::Store(format!(
                "Failed to create image store directory {}: {}",
                store_dir.display(),
                e
            ))
        })?;

        let index = load_index(store_dir)?;
        tracing::debug!(
            path = %store_dir.display(),
            images = index.len(),
            "Opened image store"
        );

        Ok(Self {
            store_dir: store_dir.to_path_buf(),
            index: Arc::new(RwLock::new(index)),
        })
    }

    /// Get a stored image by reference.
    pub async fn get(&self, reference: &str) -> Option<StoredImage> {
        self.index.read().await.get(reference).cloned()
    }

    /// Get a stored image by digest.
    pub async fn get_by_digest(&self, digest: &str) -> Option<StoredImage> {
        self.index
            .read()
            .await
            .values()
            .find(|img| img.digest == digest)
            .cloned()
    }

    /// Store the OCI layout in `source_dir` under `reference`.
    ///
    /// The layout is copied to `sha256/<digest>/` unless that directory
    /// already exists. The copy is staged next to its target and renamed
    /// into place, so a failed copy leaves nothing behind. A reference that pointed elsewhere is moved, and the
    /// old content is removed once nothing else refers to it.
    pub async fn put(&self, reference: &str, digest: &str, source_dir: &Path) -> Result<StoredImage> {
        let digest_hex = digest.strip_prefix("sha256:").unwrap_or(digest);
        let target_dir = self.store_dir.join("sha256").join(digest_hex);

        if !target_dir.exists() {
            self.install(reference, source_dir, &target_dir)?;
        }

        let stored = StoredImage {
            reference: reference.to_string(),
            digest: digest.to_string(),
            size_bytes: dir_size(&target_dir),
            stored_at: Utc::now(),
            path: target_dir,
        };

        let mut index = self.index.write().await;
        let replaced = index.insert(reference.to_string(), stored.clone());
        let orphaned = replaced.filter(|old| {
            old.digest != stored.digest && !index.values().any(|img| img.digest == old.digest)
        });
        drop(index);

        if let Some(old) = orphaned {
            remove_image_dir(&old.path)?;
        }
        self.save_index().await?;

        tracing::info!(reference, digest, "Stored image");
        Ok(stored)
    }

    /// Remove an image by reference.
    pub async fn remove(&self, reference: &str) -> Result<()> {
        let mut index = self.index.write().await;
        let image = index
            .remove(reference)
            .ok_or_else(|| PackError::Store(format!("Image not found: {}", reference)))?;
        let digest_still_used = index.values().any(|img| img.digest == image.digest);
        drop(index);

        if !digest_still_used {
            remove_image_dir(&image.path)?;
        }
        self.save_index().await
    }

    /// List all stored images, sorted by reference.
    pub async fn list(&self) -> Vec<StoredImage> {
        let mut images: Vec<StoredImage> = self.index.read().await.values().cloned().collect();
        images.sort_by(|a, b| a.reference.cmp(&b.reference));
        images
    }

    /// Get the store directory path.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn install(&self, reference: &str, source_dir: &Path, target_dir: &Path) -> Result<()> {
        let blobs_dir = self.store_dir.join("sha256");
        let store_err = |e: std::io::Error| {
            PackError::Store(format!("Failed to copy image {} to store: {}", reference, e))
        };

        std::fs::create_dir_all(&blobs_dir).map_err(store_err)?;
        let staging = tempfile::Builder::new()
            .prefix(".incoming-")
            .tempdir_in(&blobs_dir)
            .map_err(store_err)?;
        copy_dir_recursive(source_dir, staging.path()).map_err(store_err)?;
        std::fs::rename(staging.path(), target_dir).map_err(store_err)
    }

    async fn save_index(&self) -> Result<()> {
        let store_index = StoreIndex {
            images: self.list().await,
        };

        let data = serde_json::to_string_pretty(&store_index)?;
        let index_path = self.store_dir.join("index.json");

        tokio::fs::write(&index_path, data).await.map_err(|e| {
            PackError::Store(format!(
                "Failed to write image store index {}: {}",
                index_path.display(),
                e
            ))
        })
    }
}

fn load_index(store_dir: &Path) -> Result<HashMap<String, StoredImage>> {
    let index_path = store_dir.join("index.json");
    if !index_path.exists() {
        return Ok(HashMap::new());
    }

    let data = std::fs::read_to_string(&index_path).map_err(|e| {
        PackError::Store(format!(
            "Failed to read image store index {}: {}",
            index_path.display(),
            e
        ))
    })?;
    let store_index: StoreIndex = serde_json::from_str(&data)
        .map_err(|e| PackError::Store(format!("Failed to parse image store index: {}", e)))?;

    // Entries whose layout vanished from disk are dropped.
    Ok(store_index
        .images
        .into_iter()
        .filter(|image| image.path.exists())
        .map(|image| (image.reference.clone(), image))
        .collect())
}

fn remove_image_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    std::fs::remove_dir_all(path).map_err(|e| {
        PackError::Store(format!(
            "Failed to remove image directory {}: {}",
            path.display(),
            e
        ))
    })
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_oci_layout(dir: &Path) {
        std::fs::create_dir_all(dir.join("blobs/sha256")).unwrap();
        std::fs::write(dir.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();
        std::fs::write(dir.join("index.json"), r#"{"manifests":[]}"#).unwrap();
        std::fs::write(dir.join("blobs/sha256/testblob"), "x".repeat(1024)).unwrap();
    }

    #[tokio::test]
    async fn test_new_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let store_dir = tmp.path().join("images");
        let store = ImageStore::new(&store_dir).unwrap();
        assert!(store_dir.exists());
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source");
        create_test_oci_layout(&source_dir);

        let store = ImageStore::new(&tmp.path().join("store")).unwrap();
        let stored = store
            .put("myapp:latest", "sha256:abc123", &source_dir)
            .await
            .unwrap();

        assert_eq!(stored.reference, "myapp:latest");
        assert!(stored.size_bytes >= 1024);
        assert!(stored.path.join("blobs/sha256/testblob").exists());

        let fetched = store.get("myapp:latest").await.unwrap();
        assert_eq!(fetched.digest, "sha256:abc123");

        let fetched = store.get_by_digest("sha256:abc123").await.unwrap();
        assert_eq!(fetched.reference, "myapp:latest");
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path()).unwrap();
        assert!(store.get("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn test_put_moves_reference_and_drops_orphan() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source");
        create_test_oci_layout(&source_dir);

        let store = ImageStore::new(&tmp.path().join("store")).unwrap();
        let first = store.put("myapp:latest", "sha256:aaa", &source_dir).await.unwrap();
        let second = store.put("myapp:latest", "sha256:bbb", &source_dir).await.unwrap();

        assert!(!first.path.exists());
        assert!(second.path.exists());
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_shared_digest_survives_remove() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source");
        create_test_oci_layout(&source_dir);

        let store = ImageStore::new(&tmp.path().join("store")).unwrap();
        let stored = store.put("myapp:v1", "sha256:aaa", &source_dir).await.unwrap();
        store.put("myapp:latest", "sha256:aaa", &source_dir).await.unwrap();

        store.remove("myapp:v1").await.unwrap();
        assert!(stored.path.exists());
        store.remove("myapp:latest").await.unwrap();
        assert!(!stored.path.exists());
    }

    #[tokio::test]
    async fn test_remove_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path()).unwrap();
        let err = store.remove("nonexistent").await.unwrap_err();
        assert!(matches!(err, PackError::Store(_)));
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source");
        create_test_oci_layout(&source_dir);

        let store = ImageStore::new(&tmp.path().join("store")).unwrap();
        store.put("zeta:1", "sha256:aaa", &source_dir).await.unwrap();
        store.put("alpha:1", "sha256:bbb", &source_dir).await.unwrap();

        let refs: Vec<String> = store.list().await.into_iter().map(|i| i.reference).collect();
        assert_eq!(refs, vec!["alpha:1".to_string(), "zeta:1".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_copy_leaves_no_partial_layout() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source");
        create_test_oci_layout(&source_dir);
        let dangling = source_dir.join("blobs/sha256/zzz-dangling");
        std::os::unix::fs::symlink(tmp.path().join("missing"), &dangling).unwrap();

        let store_dir = tmp.path().join("store");
        let store = ImageStore::new(&store_dir).unwrap();
        let err = store
            .put("myapp:latest", "sha256:aaa", &source_dir)
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::Store(_)));
        assert!(store.get("myapp:latest").await.is_none());
        assert_eq!(std::fs::read_dir(store_dir.join("sha256")).unwrap().count(), 0);

        std::fs::remove_file(&dangling).unwrap();
        let stored = store
            .put("myapp:latest", "sha256:aaa", &source_dir)
            .await
            .unwrap();
        assert!(stored.path.join("index.json").exists());
        assert!(stored.path.join("blobs/sha256/testblob").exists());
    }

    #[tokio::test]
    async fn test_index_persistence() {
        let tmp = TempDir::new().unwrap();
        let store_dir = tmp.path().join("store");
        let source_dir = tmp.path().join("source");
        create_test_oci_layout(&source_dir);

        {
            let store = ImageStore::new(&store_dir).unwrap();
            store
                .put("myapp:latest", "sha256:persist", &source_dir)
                .await
                .unwrap();
        }

        let store = ImageStore::new(&store_dir).unwrap();
        let image = store.get("myapp:latest").await.unwrap();
        assert_eq!(image.digest, "sha256:persist");
    }
}
