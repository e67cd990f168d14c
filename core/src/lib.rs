//! A3S Pack Core - Foundational Types
//!
//! This module provides the error taxonomy, export configuration and
//! well-known constants shared by the a3s-pack runtime and CLI.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{ExportConfig, LogLevel};
pub use error::{ErrorKind, PackError, Result};

/// A3S Pack version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Image config label that carries the embedded build metadata.
pub const BUILD_LABEL: &str = "sh.packs.build";

/// Default launch directory produced by the build step.
pub const DEFAULT_LAUNCH_DIR: &str = "/launch";

/// Default path of the buildpack group declaration.
pub const DEFAULT_GROUP_PATH: &str = "./group.toml";
