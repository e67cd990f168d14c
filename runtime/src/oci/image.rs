//! OCI image representation.
//!
//! An [`OciImage`] is an immutable value. Appending a layer, replacing the
//! command or adding a label returns a new handle; the receiver keeps
//! describing the image it was created for.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use a3s_pack_core::error::{PackError, Result};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Media type of gzip-compressed layer blobs.
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Media type of the image configuration blob.
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";

/// Media type of the image manifest.
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// A physical layer: a compressed blob on disk plus its identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Diff ID (`sha256:` of the uncompressed tar stream)
    pub diff_id: String,
    /// Blob digest (`sha256:` of the stored bytes)
    pub digest: String,
    /// Blob size in bytes
    pub size: u64,
    /// Blob media type
    pub media_type: String,
    /// Location of the blob bytes
    pub blob_path: PathBuf,
}

impl Layer {
    /// Whether the stored blob is gzip-compressed.
    pub fn is_gzip(&self) -> bool {
        self.media_type.ends_with("+gzip") || self.media_type.ends_with(".tar.gzip")
    }

    /// Open a reader over the uncompressed tar stream of this layer.
    pub fn uncompressed(&self) -> Result<Box<dyn Read>> {
        let file = File::open(&self.blob_path).map_err(|e| {
            PackError::OciImage(format!(
                "Failed to open layer blob {}: {}",
                self.blob_path.display(),
                e
            ))
        })?;
        if self.is_gzip() {
            Ok(Box::new(flate2::read::GzDecoder::new(file)))
        } else {
            Ok(Box::new(file))
        }
    }

    /// Read the contents of a single archive entry, if present.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<Option<Vec<u8>>> {
        let wanted = path.as_ref();
        let mut archive = tar::Archive::new(self.uncompressed()?);
        let entries = archive.entries().map_err(|e| {
            PackError::OciImage(format!("Failed to read layer {}: {}", self.diff_id, e))
        })?;

        for entry in entries {
            let mut entry = entry.map_err(|e| {
                PackError::OciImage(format!("Failed to read layer entry: {}", e))
            })?;
            let entry_path = entry
                .path()
                .map_err(|e| PackError::OciImage(format!("Invalid layer entry path: {}", e)))?
                .into_owned();
            if entry_path == wanted {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                return Ok(Some(buf));
            }
        }
        Ok(None)
    }
}

/// Original blob bytes of an image loaded from disk, kept so an unchanged
/// image reports (and rewrites) exactly the digest it was stored under.
#[derive(Debug, Clone)]
struct SourceBlobs {
    config: Vec<u8>,
    manifest: Vec<u8>,
}

/// An OCI image: configuration document plus ordered layers (bottom to top).
#[derive(Debug, Clone)]
pub struct OciImage {
    /// Raw image configuration
    config: Value,

    /// Layers, bottom to top
    layers: Vec<Layer>,

    /// Blobs the image was loaded from, cleared by any change
    source: Option<SourceBlobs>,
}

impl OciImage {
    /// An empty linux image without layers.
    pub fn scratch() -> Self {
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        Self {
            config: json!({
                "architecture": arch,
                "os": "linux",
                "config": {},
                "rootfs": {
                    "type": "layers",
                    "diff_ids": []
                },
                "history": []
            }),
            layers: Vec::new(),
            source: None,
        }
    }

    /// Assemble an image from a configuration document and its layers.
    ///
    /// The configuration's `rootfs.diff_ids` must list exactly the layers'
    /// diff IDs, in order.
    pub fn from_parts(config: Value, layers: Vec<Layer>) -> Result<Self> {
        let diff_ids = config
            .pointer("/rootfs/diff_ids")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                PackError::OciImage("Image config has no rootfs.diff_ids".to_string())
            })?;

        if diff_ids.len() != layers.len() {
            return Err(PackError::OciImage(format!(
                "Image config lists {} diff_ids but the manifest has {} layers",
                diff_ids.len(),
                layers.len()
            )));
        }
        for (expected, layer) in diff_ids.iter().zip(&layers) {
            if expected.as_str() != Some(layer.diff_id.as_str()) {
                return Err(PackError::OciImage(format!(
                    "Layer {} does not match config diff_id {}",
                    layer.diff_id, expected
                )));
            }
        }

        Ok(Self {
            config,
            layers,
            source: None,
        })
    }

    /// Attach the original config and manifest bytes of a stored image.
    pub(crate) fn with_source_blobs(mut self, config: Vec<u8>, manifest: Vec<u8>) -> Self {
        self.source = Some(SourceBlobs { config, manifest });
        self
    }

    /// Layers, bottom to top.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Diff IDs of all layers, bottom to top.
    pub fn diff_ids(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.diff_id.clone()).collect()
    }

    /// Find a layer by its diff ID.
    pub fn layer_by_diff_id(&self, diff_id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.diff_id == diff_id)
    }

    /// Return a new image with `layer` stacked on top.
    pub fn append_layer(&self, layer: Layer, created_by: &str) -> Result<OciImage> {
        let mut next = self.derive();

        next.config
            .pointer_mut("/rootfs/diff_ids")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| {
                PackError::OciImage("Image config has no rootfs.diff_ids".to_string())
            })?
            .push(Value::String(layer.diff_id.clone()));

        if let Some(obj) = next.config.as_object_mut() {
            let history = obj.entry("history").or_insert_with(|| json!([]));
            if let Some(entries) = history.as_array_mut() {
                entries.push(json!({ "created_by": created_by }));
            }
        }

        next.layers.push(layer);
        Ok(next)
    }

    /// Return a new image whose command is exactly `cmd`.
    pub fn with_cmd(&self, cmd: Vec<String>) -> Result<OciImage> {
        let mut next = self.derive();
        next.config_section_mut()?
            .insert("Cmd".to_string(), json!(cmd));
        Ok(next)
    }

    /// Return a new image with label `key` set to `value`.
    pub fn with_label(&self, key: &str, value: &str) -> Result<OciImage> {
        let mut next = self.derive();
        let section = next.config_section_mut()?;
        let labels = section
            .entry("Labels".to_string())
            .or_insert_with(|| json!({}));
        if !labels.is_object() {
            *labels = json!({});
        }
        if let Some(labels) = labels.as_object_mut() {
            labels.insert(key.to_string(), Value::String(value.to_string()));
        }
        Ok(next)
    }

    /// Get a label value by key.
    pub fn label(&self, key: &str) -> Option<String> {
        self.config
            .pointer("/config/Labels")
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Get the configured command.
    pub fn cmd(&self) -> Option<Vec<String>> {
        self.config
            .pointer("/config/Cmd")
            .and_then(|cmd| serde_json::from_value(cmd.clone()).ok())
    }

    /// Raw configuration document.
    pub fn raw_config(&self) -> &Value {
        &self.config
    }

    /// Serialized configuration blob.
    pub fn config_bytes(&self) -> Result<Vec<u8>> {
        if let Some(ref source) = self.source {
            return Ok(source.config.clone());
        }
        Ok(serde_json::to_vec(&self.config)?)
    }

    /// Serialized manifest blob.
    pub fn manifest_bytes(&self) -> Result<Vec<u8>> {
        if let Some(ref source) = self.source {
            return Ok(source.manifest.clone());
        }

        let config_bytes = self.config_bytes()?;
        let layers: Vec<Value> = self
            .layers
            .iter()
            .map(|layer| {
                json!({
                    "mediaType": layer.media_type,
                    "digest": layer.digest,
                    "size": layer.size
                })
            })
            .collect();

        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST_MEDIA_TYPE,
            "config": {
                "mediaType": CONFIG_MEDIA_TYPE,
                "digest": format!("sha256:{}", sha256_bytes(&config_bytes)),
                "size": config_bytes.len()
            },
            "layers": layers
        });
        Ok(serde_json::to_vec(&manifest)?)
    }

    /// Image digest (`sha256:` of the manifest).
    pub fn digest(&self) -> Result<String> {
        if self.config.pointer("/rootfs/diff_ids").is_none() {
            return Err(PackError::OciImage(
                "Image config is corrupt: missing rootfs.diff_ids".to_string(),
            ));
        }
        Ok(format!("sha256:{}", sha256_bytes(&self.manifest_bytes()?)))
    }

    /// Copy used as the starting point of every change.
    fn derive(&self) -> OciImage {
        OciImage {
            config: self.config.clone(),
            layers: self.layers.clone(),
            source: None,
        }
    }

    fn config_section_mut(&mut self) -> Result<&mut Map<String, Value>> {
        let obj = self
            .config
            .as_object_mut()
            .ok_or_else(|| PackError::OciImage("Image config is not an object".to_string()))?;
        let section = obj.entry("config".to_string()).or_insert_with(|| json!({}));
        if !section.is_object() {
            *section = json!({});
        }
        section
            .as_object_mut()
            .ok_or_else(|| PackError::OciImage("Image config section is not an object".to_string()))
    }
}

/// Compute SHA256 digest of raw bytes (hex, no prefix).
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
