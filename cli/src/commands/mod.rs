//! CLI command definitions and dispatch.

mod export;
mod metadata;
mod version;

use std::path::PathBuf;
use std::sync::Arc;

use a3s_pack_core::{ErrorKind, ExportConfig, LogLevel, PackError};
use a3s_pack_runtime::{ImageSource, ImageStore, LayoutSource, StoreSource};
use clap::{Parser, Subcommand};

pub use export::ExportArgs;
pub use metadata::MetadataArgs;
pub use version::VersionArgs;

/// Generic failure.
pub const CODE_FAILED: i32 = 1;
/// Invalid arguments or launch directory.
pub const CODE_INVALID_ARGS: i32 = 3;
/// The export itself failed.
pub const CODE_FAILED_BUILD: i32 = 7;
/// Writing the exported image failed.
pub const CODE_FAILED_UPDATE: i32 = 9;

/// A3S Pack: export buildpack builds as OCI images.
#[derive(Parser, Debug)]
#[command(name = "a3s-pack", version, about)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "A3S_PACK_LOG_LEVEL", default_value = "warn")]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "A3S_PACK_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Export a launch directory as an image on top of a run image
    Export(ExportArgs),
    /// Print the build metadata embedded in an image
    Metadata(MetadataArgs),
    /// Show version information
    Version(VersionArgs),
}

/// A failed command with the process exit code it maps to.
#[derive(Debug, thiserror::Error)]
#[error("{context}: {source}")]
pub struct CliError {
    code: i32,
    context: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl CliError {
    pub fn new(
        code: i32,
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            code,
            context: context.into(),
            source: source.into(),
        }
    }

    /// Error raised while exporting: bad input is an argument error,
    /// anything else a failed build.
    pub fn export(context: impl Into<String>, err: PackError) -> Self {
        Self::new(export_exit_code(&err), context, err)
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}

/// Exit code of an error raised during the export phase.
pub fn export_exit_code(err: &PackError) -> i32 {
    match err.kind() {
        ErrorKind::InvalidInput => CODE_INVALID_ARGS,
        ErrorKind::DataIntegrity | ErrorKind::Storage => CODE_FAILED_BUILD,
    }
}

/// Open an image location: a layout directory, or a store reference.
pub(crate) fn open_source(store: Option<&Arc<ImageStore>>, reference: &str) -> Box<dyn ImageSource> {
    match store {
        Some(store) => Box::new(StoreSource::new(store.clone(), reference)),
        None => Box::new(LayoutSource::new(PathBuf::from(reference))),
    }
}

/// Open the local image store when the configuration asks for it.
pub(crate) fn open_store(config: &ExportConfig) -> Result<Option<Arc<ImageStore>>, PackError> {
    if !config.use_store {
        return Ok(None);
    }
    Ok(Some(Arc::new(ImageStore::new(&config.store_dir)?)))
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Export(args) => export::execute(args, cli.log_level).await,
        Command::Metadata(args) => metadata::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
