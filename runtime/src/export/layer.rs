//! Content-addressed layer writer.
//!
//! Serializes a directory into a deterministic tar.gz layer rooted at a
//! target prefix inside the image. The diff ID is hashed over the
//! uncompressed tar stream while it is written, the blob digest over the
//! compressed bytes, so neither requires a second pass over the file.

use std::fs::File;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use a3s_pack_core::error::{PackError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tar::HeaderMode;
use walkdir::WalkDir;

use crate::oci::{Layer, OciImage, LAYER_MEDIA_TYPE};

/// Information about a created layer.
#[derive(Debug, Clone)]
pub struct LayerInfo {
    /// Path to the layer tar.gz file
    pub path: PathBuf,
    /// SHA256 of the compressed blob (hex, without "sha256:" prefix)
    pub digest: String,
    /// SHA256 of the uncompressed tar stream (hex, without "sha256:" prefix)
    pub diff_id: String,
    /// Compressed size in bytes
    pub size: u64,
}

impl LayerInfo {
    /// Get the blob digest with "sha256:" prefix.
    pub fn prefixed_digest(&self) -> String {
        format!("sha256:{}", self.digest)
    }

    /// Get the diff ID with "sha256:" prefix.
    pub fn prefixed_diff_id(&self) -> String {
        format!("sha256:{}", self.diff_id)
    }

    /// Describe the written blob as an image layer.
    pub fn into_layer(self) -> Layer {
        Layer {
            diff_id: self.prefixed_diff_id(),
            digest: self.prefixed_digest(),
            size: self.size,
            media_type: LAYER_MEDIA_TYPE.to_string(),
            blob_path: self.path,
        }
    }
}

/// Reject target prefixes that are absolute or climb out of the image root.
pub fn validate_target_path(target: &Path) -> Result<()> {
    if target.as_os_str().is_empty() {
        return Err(PackError::InvalidTargetPath("<empty>".to_string()));
    }
    for component in target.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(PackError::InvalidTargetPath(
                    target.display().to_string(),
                ))
            }
        }
    }
    Ok(())
}

/// Write `source_dir` as a layer at `tar_path` and stack it onto `image`.
///
/// Returns the new image and the layer's prefixed diff ID.
pub fn write_layer(
    image: &OciImage,
    tar_path: &Path,
    source_dir: &Path,
    target: &Path,
) -> Result<(OciImage, String)> {
    let info = create_layer_from_dir(source_dir, target, tar_path)?;
    let diff_id = info.prefixed_diff_id();

    tracing::debug!(
        source = %source_dir.display(),
        target = %target.display(),
        diff_id = %diff_id,
        size = info.size,
        "Created layer"
    );

    let image = image.append_layer(info.into_layer(), &format!("a3s-pack: {}", target.display()))?;
    Ok((image, diff_id))
}

/// Create a tar.gz layer from an entire directory.
///
/// Entries are emitted in lexical order with paths `target_prefix/<relative>`.
/// Directories are implied and not emitted. Regular files carry their
/// contents; symlinks and special files are header-only. Headers use
/// deterministic metadata (fixed mtime, zero ownership).
pub fn create_layer_from_dir(
    src_dir: &Path,
    target_prefix: &Path,
    output_path: &Path,
) -> Result<LayerInfo> {
    validate_target_path(target_prefix)?;
    if !src_dir.is_dir() {
        return Err(PackError::NotADirectory(src_dir.display().to_string()));
    }

    let file = File::create(output_path).map_err(|e| {
        PackError::Layer(format!(
            "Failed to create layer file {}: {}",
            output_path.display(),
            e
        ))
    })?;

    let blob = HashingWriter::new(file);
    let stream = HashingWriter::new(GzEncoder::new(blob, Compression::default()));
    let mut builder = tar::Builder::new(stream);
    builder.mode(HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            PackError::Layer(format!(
                "Failed to walk directory {}: {}",
                src_dir.display(),
                e
            ))
        })?;
        if entry.file_type().is_dir() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(|e| PackError::Layer(format!("Failed to strip prefix: {}", e)))?;
        let tar_path = target_prefix.join(relative);

        builder
            .append_path_with_name(entry.path(), &tar_path)
            .map_err(|e| {
                PackError::Layer(format!(
                    "Failed to add {} to layer: {}",
                    entry.path().display(),
                    e
                ))
            })?;
    }

    let stream = builder
        .into_inner()
        .map_err(|e| PackError::Layer(format!("Failed to finalize layer: {}", e)))?;
    let HashingWriter {
        inner: encoder,
        hasher: diff_hasher,
        ..
    } = stream;
    let mut blob = encoder
        .finish()
        .map_err(|e| PackError::Layer(format!("Failed to compress layer: {}", e)))?;
    blob.flush().map_err(|e| {
        PackError::Layer(format!(
            "Failed to flush layer file {}: {}",
            output_path.display(),
            e
        ))
    })?;

    Ok(LayerInfo {
        path: output_path.to_path_buf(),
        digest: hex::encode(blob.hasher.finalize()),
        diff_id: hex::encode(diff_hasher.finalize()),
        size: blob.bytes_written,
    })
}

/// Writer that hashes and counts everything passed through to `inner`.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes_written: u64,
}

impl<W> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_written: 0,
        }
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.bytes_written = self.bytes_written.saturating_add(written as u64);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
