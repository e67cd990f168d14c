//! Build metadata embedded in exported images.
//!
//! The record is stored as JSON under the [`BUILD_LABEL`] label and read
//! back by the next export to find layers it can reuse.

use std::collections::BTreeMap;

use a3s_pack_core::error::{PackError, Result};
use a3s_pack_core::BUILD_LABEL;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::oci::OciImage;

/// Provenance record of one export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildMetadata {
    #[serde(default)]
    pub app: AppMetadata,
    #[serde(default)]
    pub stack: StackMetadata,
    /// Buildpacks in processing order
    #[serde(default)]
    pub buildpacks: Vec<BuildpackMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Diff ID of the app layer
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackMetadata {
    /// Digest of the run image
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildpackMetadata {
    /// Buildpack id
    pub key: String,
    /// Layer name → layer record
    #[serde(default)]
    pub layers: BTreeMap<String, LayerMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerMetadata {
    /// Diff ID of the layer
    pub sha: String,
    /// Data declared by the buildpack in the layer descriptor
    #[serde(default = "empty_data", deserialize_with = "null_as_empty")]
    pub data: Value,
}

fn empty_data() -> Value {
    Value::Object(serde_json::Map::new())
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Value, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(if value.is_null() { empty_data() } else { value })
}

impl BuildMetadata {
    /// Start a record for an export on top of the run image `stack_sha`.
    pub fn new(stack_sha: impl Into<String>) -> Self {
        Self {
            stack: StackMetadata {
                sha: stack_sha.into(),
            },
            ..Default::default()
        }
    }

    pub fn set_app(&mut self, sha: impl Into<String>) {
        self.app.sha = sha.into();
    }

    /// Get or create the entry for `key`, keeping first-seen order.
    pub fn add_buildpack(&mut self, key: &str) -> &mut BuildpackMetadata {
        let pos = match self.buildpacks.iter().position(|bp| bp.key == key) {
            Some(pos) => pos,
            None => {
                self.buildpacks.push(BuildpackMetadata {
                    key: key.to_string(),
                    layers: BTreeMap::new(),
                });
                self.buildpacks.len() - 1
            }
        };
        &mut self.buildpacks[pos]
    }

    /// Record a layer; a later record for the same name replaces the earlier one.
    pub fn accumulate(&mut self, buildpack: &str, layer: &str, sha: impl Into<String>, data: Value) {
        self.add_buildpack(buildpack).layers.insert(
            layer.to_string(),
            LayerMetadata {
                sha: sha.into(),
                data,
            },
        );
    }

    /// Look up a layer record.
    pub fn layer(&self, buildpack: &str, layer: &str) -> Option<&LayerMetadata> {
        self.buildpacks
            .iter()
            .find(|bp| bp.key == buildpack)
            .and_then(|bp| bp.layers.get(layer))
    }

    /// Serialize to the label wire form.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the label wire form.
    pub fn decode(value: &str) -> Result<Self> {
        serde_json::from_str(value)
            .map_err(|e| PackError::Metadata(format!("Invalid {} label: {}", BUILD_LABEL, e)))
    }

    /// Read the record from an image that is expected to carry one.
    pub fn from_image(image: &OciImage) -> Result<Self> {
        let label = image
            .label(BUILD_LABEL)
            .ok_or_else(|| PackError::Metadata(format!("Image has no {} label", BUILD_LABEL)))?;
        Self::decode(&label)
    }

    /// Read the record from an optional previous image.
    ///
    /// A missing image, missing label or malformed label all mean there is
    /// no prior data to reuse.
    pub fn from_image_optional(image: Option<&OciImage>) -> Option<Self> {
        let image = image?;
        match Self::from_image(image) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::warn!(error = %e, "Previous image metadata unavailable, exporting without reuse");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let mut metadata = BuildMetadata::new("sha256:stack");
        metadata.set_app("sha256:app");
        metadata.accumulate("buildpack.id", "layer1", "sha256:l1", json!({"mykey": "myval"}));

        let value: Value = serde_json::from_str(&metadata.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "app": {"sha": "sha256:app"},
                "stack": {"sha": "sha256:stack"},
                "buildpacks": [{
                    "key": "buildpack.id",
                    "layers": {
                        "layer1": {"sha": "sha256:l1", "data": {"mykey": "myval"}}
                    }
                }]
            })
        );
    }

    #[test]
    fn test_buildpack_order_follows_processing() {
        let mut metadata = BuildMetadata::new("s");
        metadata.add_buildpack("zeta");
        metadata.accumulate("alpha", "l", "sha256:a", empty_data());
        metadata.accumulate("zeta", "l", "sha256:z", empty_data());

        let keys: Vec<&str> = metadata.buildpacks.iter().map(|bp| bp.key.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_accumulate_last_write_wins() {
        let mut metadata = BuildMetadata::new("s");
        metadata.accumulate("bp", "deps", "sha256:one", empty_data());
        metadata.accumulate("bp", "deps", "sha256:two", json!({"v": 2}));

        assert_eq!(metadata.buildpacks[0].layers.len(), 1);
        let layer = metadata.layer("bp", "deps").unwrap();
        assert_eq!(layer.sha, "sha256:two");
        assert_eq!(layer.data, json!({"v": 2}));
    }

    #[test]
    fn test_decode_defaults() {
        let metadata = BuildMetadata::decode(
            r#"{"buildpacks":[{"key":"bp","layers":{"a":{"sha":"sha256:a"},"b":{"sha":"sha256:b","data":null}}}]}"#,
        )
        .unwrap();
        assert_eq!(metadata.app.sha, "");
        assert_eq!(metadata.layer("bp", "a").unwrap().data, json!({}));
        assert_eq!(metadata.layer("bp", "b").unwrap().data, json!({}));
        assert!(metadata.layer("bp", "c").is_none());
        assert!(metadata.layer("other", "a").is_none());
    }

    #[test]
    fn test_decode_malformed() {
        let err = BuildMetadata::decode("{not json").unwrap_err();
        assert!(matches!(err, PackError::Metadata(_)));
    }

    #[test]
    fn test_image_roundtrip() {
        let mut metadata = BuildMetadata::new("sha256:stack");
        metadata.set_app("sha256:app");
        metadata.add_buildpack("empty.bp");
        metadata.accumulate("bp", "plain", "sha256:p", empty_data());

        let image = OciImage::scratch()
            .with_label(BUILD_LABEL, &metadata.encode().unwrap())
            .unwrap();
        assert_eq!(BuildMetadata::from_image(&image).unwrap(), metadata);
    }

    #[test]
    fn test_from_image_missing_label() {
        let image = OciImage::scratch();
        assert!(matches!(
            BuildMetadata::from_image(&image),
            Err(PackError::Metadata(_))
        ));
        assert!(BuildMetadata::from_image_optional(Some(&image)).is_none());
        assert!(BuildMetadata::from_image_optional(None).is_none());
    }

    #[test]
    fn test_from_image_optional_malformed_label() {
        let image = OciImage::scratch().with_label(BUILD_LABEL, "garbage").unwrap();
        assert!(BuildMetadata::from_image_optional(Some(&image)).is_none());
    }
}
