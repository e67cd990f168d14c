//! Export stage: composes a launch directory into an OCI image.

mod exporter;
pub mod launch;
pub mod layer;
pub mod metadata;
pub mod reuse;

pub use exporter::Exporter;
pub use launch::{read_layer_data, LaunchDir, LaunchMetadata, LayerCandidate, Process};
pub use layer::{create_layer_from_dir, validate_target_path, write_layer, LayerInfo};
pub use metadata::{AppMetadata, BuildMetadata, BuildpackMetadata, LayerMetadata, StackMetadata};
pub use reuse::{attach_existing, resolve, LayerAction, PreviousBuild};
