use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{PackError, Result};

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Launch directory written by the build step
    pub launch_dir: PathBuf,

    /// Buildpack group declaration (ordered buildpack ids)
    pub group_path: PathBuf,

    /// Buildpack installation directory, used to validate group entries
    pub buildpacks_dir: Option<PathBuf>,

    /// Parent directory for the scratch work area (system temp dir when unset)
    pub work_dir: Option<PathBuf>,

    /// Read and write images through the local image store instead of
    /// OCI layout directories
    pub use_store: bool,

    /// Local image store directory
    pub store_dir: PathBuf,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            launch_dir: PathBuf::from(crate::DEFAULT_LAUNCH_DIR),
            group_path: PathBuf::from(crate::DEFAULT_GROUP_PATH),
            buildpacks_dir: None,
            work_dir: None,
            use_store: false,
            store_dir: Self::default_store_dir(),
            log_level: LogLevel::Warn,
        }
    }
}

impl ExportConfig {
    /// Default local image store location (~/.a3s/pack/images).
    pub fn default_store_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".a3s"))
            .unwrap_or_else(|| PathBuf::from(".a3s"))
            .join("pack")
            .join("images")
    }

    /// Check the configuration before any image work starts.
    pub fn validate(&self) -> Result<()> {
        if self.launch_dir.as_os_str().is_empty() {
            return Err(PackError::InvalidArgument(
                "launch directory must not be empty".to_string(),
            ));
        }
        if self.group_path.as_os_str().is_empty() {
            return Err(PackError::InvalidArgument(
                "group path must not be empty".to_string(),
            ));
        }
        if self.use_store && self.store_dir.as_os_str().is_empty() {
            return Err(PackError::InvalidArgument(
                "store directory must not be empty when the local store is used".to_string(),
            ));
        }
        if let Some(ref work_dir) = self.work_dir {
            if !work_dir.is_dir() {
                return Err(PackError::InvalidArgument(format!(
                    "work directory {} does not exist",
                    work_dir.display()
                )));
            }
        }
        Ok(())
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(PackError::InvalidArgument(format!(
                "unknown log level: {}",
                other
            ))),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExportConfig::default();
        assert_eq!(config.launch_dir, PathBuf::from("/launch"));
        assert_eq!(config.group_path, PathBuf::from("./group.toml"));
        assert!(!config.use_store);
        assert!(config.store_dir.ends_with("pack/images"));
        assert_eq!(config.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_validate_default() {
        assert!(ExportConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_launch_dir() {
        let config = ExportConfig {
            launch_dir: PathBuf::new(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PackError::InvalidArgument(_)));
    }

    #[test]
    fn test_validate_missing_work_dir() {
        let config = ExportConfig {
            work_dir: Some(PathBuf::from("/nonexistent/a3s-pack/work")),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_to_tracing() {
        assert_eq!(tracing::Level::from(LogLevel::Info), tracing::Level::INFO);
        assert_eq!(LogLevel::Error.as_filter(), "error");
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = ExportConfig {
            use_store: true,
            log_level: LogLevel::Debug,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"log_level\":\"debug\""));
        let parsed: ExportConfig = serde_json::from_str(&json).unwrap();
        assert!(parsed.use_store);
        assert_eq!(parsed.log_level, LogLevel::Debug);
    }
}
