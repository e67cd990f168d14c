//! OCI image layout I/O.
//!
//! Reads an image from, and writes an image to, a directory following the
//! OCI image layout:
//!
//! ```text
//! image/
//! ├── oci-layout
//! ├── index.json
//! └── blobs/sha256/<manifest|config|layers>
//! ```

use std::path::{Path, PathBuf};

use a3s_pack_core::error::{PackError, Result};
use oci_spec::image::ImageIndex;
use serde_json::{json, Value};

use super::image::{sha256_bytes, Layer, OciImage, LAYER_MEDIA_TYPE, MANIFEST_MEDIA_TYPE};

const OCI_LAYOUT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;

/// Load an OCI image from a layout directory.
pub fn read_layout(path: impl AsRef<Path>) -> Result<OciImage> {
    let root_dir = path.as_ref();
    validate_oci_layout(root_dir)?;

    let index = load_index(root_dir)?;
    let manifest_digest = index
        .manifests()
        .first()
        .ok_or_else(|| PackError::OciImage("No manifests in index.json".to_string()))?
        .digest()
        .to_string();

    let manifest_bytes = read_blob(root_dir, &manifest_digest, "manifest")?;
    let manifest: Value = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| PackError::OciImage(format!("Failed to parse manifest: {}", e)))?;

    let config_digest = manifest
        .pointer("/config/digest")
        .and_then(Value::as_str)
        .ok_or_else(|| PackError::OciImage("Manifest has no config digest".to_string()))?;
    let config_bytes = read_blob(root_dir, config_digest, "config")?;
    let config: Value = serde_json::from_slice(&config_bytes)
        .map_err(|e| PackError::OciImage(format!("Failed to parse config: {}", e)))?;

    let descriptors = manifest
        .get("layers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let diff_ids: Vec<String> = config
        .pointer("/rootfs/diff_ids")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if diff_ids.len() != descriptors.len() {
        return Err(PackError::OciImage(format!(
            "Image at {} lists {} diff_ids for {} layers",
            root_dir.display(),
            diff_ids.len(),
            descriptors.len()
        )));
    }

    let mut layers = Vec::with_capacity(descriptors.len());
    for (desc, diff_id) in descriptors.iter().zip(diff_ids) {
        let digest = desc
            .get("digest")
            .and_then(Value::as_str)
            .ok_or_else(|| PackError::OciImage("Layer descriptor has no digest".to_string()))?;
        layers.push(Layer {
            diff_id,
            digest: digest.to_string(),
            size: desc.get("size").and_then(Value::as_u64).unwrap_or(0),
            media_type: desc
                .get("mediaType")
                .and_then(Value::as_str)
                .unwrap_or(LAYER_MEDIA_TYPE)
                .to_string(),
            blob_path: blob_path(root_dir, digest),
        });
    }

    tracing::debug!(
        path = %root_dir.display(),
        manifest = %manifest_digest,
        "Loaded OCI image layout"
    );

    Ok(OciImage::from_parts(config, layers)?.with_source_blobs(config_bytes, manifest_bytes))
}

/// Write an OCI image into a layout directory and return its digest.
///
/// Layer blobs already present in the layout are not copied again.
pub fn write_layout(image: &OciImage, path: impl AsRef<Path>, reference: Option<&str>) -> Result<String> {
    let output_dir = path.as_ref();
    let blobs_dir = output_dir.join("blobs").join("sha256");
    std::fs::create_dir_all(&blobs_dir).map_err(|e| {
        PackError::OciImage(format!(
            "Failed to create blobs directory {}: {}",
            blobs_dir.display(),
            e
        ))
    })?;

    for layer in image.layers() {
        let target = blob_path(output_dir, &layer.digest);
        if target.exists() {
            continue;
        }
        std::fs::copy(&layer.blob_path, &target).map_err(|e| {
            PackError::OciImage(format!(
                "Failed to copy layer {} from {}: {}",
                layer.diff_id,
                layer.blob_path.display(),
                e
            ))
        })?;
    }

    let config_bytes = image.config_bytes()?;
    write_blob(output_dir, &config_bytes, "config")?;

    let manifest_bytes = image.manifest_bytes()?;
    let manifest_digest = write_blob(output_dir, &manifest_bytes, "manifest")?;

    let mut descriptor = json!({
        "mediaType": MANIFEST_MEDIA_TYPE,
        "digest": manifest_digest,
        "size": manifest_bytes.len()
    });
    if let Some(reference) = reference {
        descriptor["annotations"] = json!({ "org.opencontainers.image.ref.name": reference });
    }
    let index = json!({
        "schemaVersion": 2,
        "manifests": [descriptor]
    });
    std::fs::write(
        output_dir.join("index.json"),
        serde_json::to_string_pretty(&index)?,
    )
    .map_err(|e| PackError::OciImage(format!("Failed to write index.json: {}", e)))?;

    std::fs::write(output_dir.join("oci-layout"), OCI_LAYOUT)
        .map_err(|e| PackError::OciImage(format!("Failed to write oci-layout: {}", e)))?;

    tracing::debug!(
        path = %output_dir.display(),
        digest = %manifest_digest,
        layers = image.layers().len(),
        "Wrote OCI image layout"
    );

    Ok(manifest_digest)
}

/// Validate that the directory contains a valid OCI layout.
fn validate_oci_layout(root_dir: &Path) -> Result<()> {
    for required in ["oci-layout", "index.json", "blobs"] {
        if !root_dir.join(required).exists() {
            return Err(PackError::OciImage(format!(
                "Not a valid OCI layout: missing {} in {}",
                required,
                root_dir.display()
            )));
        }
    }
    Ok(())
}

fn load_index(root_dir: &Path) -> Result<ImageIndex> {
    let index_path = root_dir.join("index.json");
    let content = std::fs::read_to_string(&index_path).map_err(|e| {
        PackError::OciImage(format!(
            "Failed to read index.json at {}: {}",
            index_path.display(),
            e
        ))
    })?;

    serde_json::from_str(&content)
        .map_err(|e| PackError::OciImage(format!("Failed to parse index.json: {}", e)))
}

fn read_blob(root_dir: &Path, digest: &str, what: &str) -> Result<Vec<u8>> {
    let path = blob_path(root_dir, digest);
    std::fs::read(&path).map_err(|e| {
        PackError::OciImage(format!(
            "Failed to read {} at {}: {}",
            what,
            path.display(),
            e
        ))
    })
}

fn write_blob(root_dir: &Path, data: &[u8], what: &str) -> Result<String> {
    let digest = format!("sha256:{}", sha256_bytes(data));
    let path = blob_path(root_dir, &digest);
    std::fs::write(&path, data).map_err(|e| {
        PackError::OciImage(format!(
            "Failed to write {} blob {}: {}",
            what,
            path.display(),
            e
        ))
    })?;
    Ok(digest)
}

/// Get the path to a blob by digest.
fn blob_path(root_dir: &Path, digest: &str) -> PathBuf {
    let (algorithm, hash) = digest.split_once(':').unwrap_or(("sha256", digest));
    root_dir.join("blobs").join(algorithm).join(hash)
}
