//! A3S Pack Runtime - export engine for buildpack builds.
//!
//! Composes the launch directory produced by a build into an OCI image on
//! top of a run image, reusing layers from a previous build where the
//! build step left only a layer descriptor behind.

#![allow(clippy::result_large_err)]

pub mod buildpack;
pub mod export;
pub mod oci;

// Re-export common types
pub use buildpack::{read_group_ids, Buildpack, BuildpackGroup, BuildpackMap, BuildpackOrder};
pub use export::{BuildMetadata, BuildpackMetadata, Exporter, LaunchDir, LayerAction, LayerInfo};
pub use oci::{ImageSource, ImageStore, Layer, LayoutSource, OciImage, StoreSource, StoredImage};

/// A3S Pack Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
