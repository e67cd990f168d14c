//! `a3s-pack export` command.

use std::path::PathBuf;

use a3s_pack_core::{ExportConfig, LogLevel, PackError, Result};
use a3s_pack_runtime::{read_group_ids, BuildpackMap, Exporter, LaunchDir};
use clap::Args;

use super::{
    open_source, open_store, CliError, CODE_FAILED, CODE_FAILED_BUILD, CODE_FAILED_UPDATE,
    CODE_INVALID_ARGS,
};

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Image to write (layout directory, or store reference with --store)
    pub image: String,

    /// Run image to build on (layout directory, or store reference with --store)
    #[arg(long, env = "A3S_PACK_RUN_IMAGE")]
    pub run_image: String,

    /// Launch directory written by the build step
    #[arg(long = "launch", env = "A3S_PACK_LAUNCH_DIR", default_value = a3s_pack_core::DEFAULT_LAUNCH_DIR)]
    pub launch_dir: PathBuf,

    /// Buildpack group declaration
    #[arg(long = "group", env = "A3S_PACK_GROUP_PATH", default_value = a3s_pack_core::DEFAULT_GROUP_PATH)]
    pub group_path: PathBuf,

    /// Installed buildpacks; group entries not installed here are dropped
    #[arg(long, env = "A3S_PACK_BUILDPACKS_DIR")]
    pub buildpacks_dir: Option<PathBuf>,

    /// Read and write images through the local image store
    #[arg(long = "store", env = "A3S_PACK_USE_STORE")]
    pub use_store: bool,

    /// Local image store directory
    #[arg(long, env = "A3S_PACK_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Parent directory of the scratch work area
    #[arg(long, env = "A3S_PACK_WORK_DIR")]
    pub work_dir: Option<PathBuf>,
}

impl ExportArgs {
    pub fn to_config(&self, log_level: LogLevel) -> ExportConfig {
        let defaults = ExportConfig::default();
        ExportConfig {
            launch_dir: self.launch_dir.clone(),
            group_path: self.group_path.clone(),
            buildpacks_dir: self.buildpacks_dir.clone(),
            work_dir: self.work_dir.clone(),
            use_store: self.use_store,
            store_dir: self.store_dir.clone().unwrap_or(defaults.store_dir),
            log_level,
        }
    }
}

pub async fn execute(args: ExportArgs, log_level: LogLevel) -> std::result::Result<(), CliError> {
    let config = args.to_config(log_level);
    if args.image.is_empty() || args.run_image.is_empty() {
        return Err(CliError::new(
            CODE_INVALID_ARGS,
            "parse arguments",
            PackError::InvalidArgument("image and run image must not be empty".to_string()),
        ));
    }
    config
        .validate()
        .map_err(|e| CliError::new(CODE_INVALID_ARGS, "parse arguments", e))?;
    tracing::debug!(?config, "Export configuration");

    let store = open_store(&config).map_err(|e| CliError::new(CODE_FAILED, "open image store", e))?;
    let repo = open_source(store.as_ref(), &args.image);
    let run = open_source(store.as_ref(), &args.run_image);

    let run_image = run.fetch().await.map_err(|e| {
        CliError::new(CODE_FAILED_BUILD, format!("get image for {}", run.reference()), e)
    })?;
    let previous = match repo.fetch().await {
        Ok(image) => Some(image),
        Err(e) => {
            tracing::info!(image = %repo.reference(), error = %e, "No previous image, exporting from scratch");
            None
        }
    };

    let buildpacks = read_buildpacks(&config).map_err(|e| CliError::export("read group", e))?;
    let launch = LaunchDir::open(&config.launch_dir).map_err(|e| CliError::export("open launch directory", e))?;

    // Holds the layer archives until the image is written; removed on drop.
    let work = scratch_dir(&config).map_err(|e| CliError::new(CODE_FAILED, "create temp directory", e))?;

    let exporter = Exporter::new(buildpacks, work.path());
    let image = tokio::task::spawn_blocking(move || exporter.export(&launch, &run_image, previous.as_ref()))
        .await
        .map_err(|e| CliError::new(CODE_FAILED_BUILD, "export", e))?
        .map_err(|e| CliError::export("export", e))?;

    let digest = repo
        .write(&image)
        .await
        .map_err(|e| CliError::new(CODE_FAILED_UPDATE, "write", e))?;

    tracing::info!(image = %repo.reference(), digest = %digest, "Exported image");
    println!("{}", digest);
    Ok(())
}

/// Ordered buildpack ids, resolved against installed buildpacks when a
/// buildpacks directory is configured.
fn read_buildpacks(config: &ExportConfig) -> Result<Vec<String>> {
    match config.buildpacks_dir {
        Some(ref dir) => {
            let map = BuildpackMap::from_dir(dir)?;
            Ok(map.read_group(&config.group_path)?.ids())
        }
        None => read_group_ids(&config.group_path),
    }
}

fn scratch_dir(config: &ExportConfig) -> std::io::Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("a3s-pack.export.");
    match config.work_dir {
        Some(ref parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    }
}
