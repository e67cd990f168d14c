//! Layer reuse decisions.
//!
//! | layer dir | descriptor | prior entry | action      |
//! |-----------|------------|-------------|-------------|
//! | yes       | yes        | any         | NeedsWrite  |
//! | no        | yes        | yes         | UseExisting |
//! | no        | yes        | no          | Fail        |
//! | any       | no         | any         | Skip        |

use a3s_pack_core::error::{PackError, Result};

use super::metadata::BuildMetadata;
use crate::oci::OciImage;

/// What to do with one layer candidate.
#[derive(Debug)]
pub enum LayerAction<'a> {
    /// Tar the layer directory into a new layer.
    NeedsWrite,
    /// Re-attach the layer recorded under `diff_id` in `source`.
    UseExisting {
        diff_id: String,
        source: &'a OciImage,
    },
    /// Not a layer candidate.
    Skip,
    /// Required prior data is unavailable.
    Fail(PackError),
}

/// The previous build, as seen by the resolver.
#[derive(Debug, Clone, Copy)]
pub struct PreviousBuild<'a> {
    pub metadata: &'a BuildMetadata,
    pub image: &'a OciImage,
}

/// Decide how to produce `buildpack`/`layer`.
pub fn resolve<'a>(
    buildpack: &str,
    layer: &str,
    has_dir: bool,
    has_descriptor: bool,
    previous: Option<PreviousBuild<'a>>,
) -> LayerAction<'a> {
    if !has_descriptor {
        return LayerAction::Skip;
    }
    if has_dir {
        return LayerAction::NeedsWrite;
    }

    let recorded = previous.and_then(|prev| {
        prev.metadata
            .layer(buildpack, layer)
            .filter(|entry| !entry.sha.is_empty())
            .map(|entry| (entry.sha.clone(), prev.image))
    });

    match recorded {
        Some((diff_id, source)) => LayerAction::UseExisting { diff_id, source },
        None => LayerAction::Fail(PackError::MissingLayerData {
            buildpack: buildpack.to_string(),
            layer: layer.to_string(),
        }),
    }
}

/// Stack the physical layer `diff_id` of `source` onto `image`.
///
/// The layer is attached as recorded; its blob is not re-read.
pub fn attach_existing(
    image: &OciImage,
    source: &OciImage,
    diff_id: &str,
    buildpack: &str,
    layer: &str,
) -> Result<OciImage> {
    let existing = source
        .layer_by_diff_id(diff_id)
        .ok_or_else(|| PackError::PreviousLayerNotFound {
            buildpack: buildpack.to_string(),
            layer: layer.to_string(),
            diff_id: diff_id.to_string(),
        })?;

    image.append_layer(
        existing.clone(),
        &format!("a3s-pack: launch/{}/{} (reused)", buildpack, layer),
    )
}
