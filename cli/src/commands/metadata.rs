//! `a3s-pack metadata` command: print the embedded build metadata as JSON.

use std::path::PathBuf;

use a3s_pack_core::ExportConfig;
use a3s_pack_runtime::BuildMetadata;
use clap::Args;

use super::{open_source, open_store, CliError, CODE_FAILED};

#[derive(Args, Debug)]
pub struct MetadataArgs {
    /// Image to read (layout directory, or store reference with --store)
    pub image: String,

    /// Read the image from the local image store
    #[arg(long = "store", env = "A3S_PACK_USE_STORE")]
    pub use_store: bool,

    /// Local image store directory
    #[arg(long, env = "A3S_PACK_STORE_DIR")]
    pub store_dir: Option<PathBuf>,
}

pub async fn execute(args: MetadataArgs) -> Result<(), CliError> {
    let mut config = ExportConfig {
        use_store: args.use_store,
        ..Default::default()
    };
    if let Some(dir) = args.store_dir {
        config.store_dir = dir;
    }

    let store = open_store(&config).map_err(|e| CliError::new(CODE_FAILED, "open image store", e))?;
    let source = open_source(store.as_ref(), &args.image);

    let image = source
        .fetch()
        .await
        .map_err(|e| CliError::new(CODE_FAILED, format!("get image for {}", source.reference()), e))?;
    let metadata = BuildMetadata::from_image(&image)
        .map_err(|e| CliError::new(CODE_FAILED, "read build metadata", e))?;

    let json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| CliError::new(CODE_FAILED, "encode build metadata", e))?;
    println!("{}", json);
    Ok(())
}
