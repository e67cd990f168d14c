//! OCI image support for A3S Pack.
//!
//! - Immutable image model (config + ordered layers)
//! - OCI image layout read/write
//! - Image sources backed by layout directories or the local store
//!
//! ```text
//! image/
//! ├── oci-layout           (OCI layout marker)
//! ├── index.json           (Image index)
//! └── blobs/
//!     └── sha256/
//!         ├── <manifest>   (Image manifest)
//!         ├── <config>     (Image configuration)
//!         └── <layers>     (Filesystem layers)
//! ```

mod image;
mod layout;
mod source;
pub mod store;

pub use image::{
    sha256_bytes, Layer, OciImage, CONFIG_MEDIA_TYPE, LAYER_MEDIA_TYPE,
    MANIFEST_MEDIA_TYPE,
};
pub use layout::{read_layout, write_layout};
pub use source::{ImageSource, LayoutSource, StoreSource};
pub use store::{ImageStore, StoredImage};
