use thiserror::Error;

/// Broad failure classes surfaced to callers for scripting and automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input (launch directory, descriptors, paths).
    InvalidInput,
    /// The launch directory violates its contract with the build step.
    DataIntegrity,
    /// Reading or writing files, archives, blobs or image configuration failed.
    Storage,
}

/// A3S Pack error types
#[derive(Error, Debug)]
pub enum PackError {
    /// Invalid argument or configuration
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Launch directory (or its app tree) is missing
    #[error("Launch directory not found: {0}")]
    MissingLaunchDir(String),

    /// A required descriptor file is missing
    #[error("Missing descriptor: {0}")]
    MissingDescriptor(String),

    /// Layer target path escapes the image root or is absolute
    #[error("Invalid layer target path: {0}")]
    InvalidTargetPath(String),

    /// Layer descriptor present without a directory and without prior data
    #[error("toml file layer expected, but no previous image data: {buildpack}/{layer}")]
    MissingLayerData { buildpack: String, layer: String },

    /// Prior metadata names a layer the previous image does not contain
    #[error("Previous layer not found: {buildpack}/{layer} ({diff_id})")]
    PreviousLayerNotFound {
        buildpack: String,
        layer: String,
        diff_id: String,
    },

    /// Descriptor content could not be parsed
    #[error("Invalid descriptor {path}: {message}")]
    Descriptor { path: String, message: String },

    /// No process with type `web` was declared
    #[error("Missing process with web type in {0}")]
    MissingWebProcess(String),

    /// A path expected to be a directory is something else
    #[error("Expected {0} to be a directory")]
    NotADirectory(String),

    /// Embedded build metadata is absent or malformed
    #[error("Build metadata error: {0}")]
    Metadata(String),

    /// Layer archive creation failed
    #[error("Layer error: {0}")]
    Layer(String),

    /// OCI image error
    #[error("OCI image error: {0}")]
    OciImage(String),

    /// Local image store error
    #[error("Image store error: {0}")]
    Store(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PackError {
    /// Classify the error for exit-code reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackError::InvalidArgument(_)
            | PackError::MissingLaunchDir(_)
            | PackError::MissingDescriptor(_)
            | PackError::InvalidTargetPath(_) => ErrorKind::InvalidInput,
            PackError::MissingLayerData { .. }
            | PackError::PreviousLayerNotFound { .. }
            | PackError::Descriptor { .. }
            | PackError::MissingWebProcess(_)
            | PackError::NotADirectory(_)
            | PackError::Metadata(_) => ErrorKind::DataIntegrity,
            PackError::Layer(_)
            | PackError::OciImage(_)
            | PackError::Store(_)
            | PackError::Io(_)
            | PackError::Serialization(_) => ErrorKind::Storage,
        }
    }
}

impl From<serde_json::Error> for PackError {
    fn from(err: serde_json::Error) -> Self {
        PackError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PackError {
    fn from(err: toml::de::Error) -> Self {
        PackError::Serialization(err.to_string())
    }
}

/// Result type alias for A3S Pack operations
pub type Result<T> = std::result::Result<T, PackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_layer_data_display() {
        let error = PackError::MissingLayerData {
            buildpack: "buildpack.id".to_string(),
            layer: "layer1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "toml file layer expected, but no previous image data: buildpack.id/layer1"
        );
        assert_eq!(error.kind(), ErrorKind::DataIntegrity);
    }

    #[test]
    fn test_previous_layer_not_found_display() {
        let error = PackError::PreviousLayerNotFound {
            buildpack: "bp".to_string(),
            layer: "deps".to_string(),
            diff_id: "sha256:abc".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Previous layer not found: bp/deps (sha256:abc)"
        );
    }

    #[test]
    fn test_missing_web_process_display() {
        let error = PackError::MissingWebProcess("/launch/app/metadata.toml".to_string());
        assert_eq!(
            error.to_string(),
            "Missing process with web type in /launch/app/metadata.toml"
        );
        assert_eq!(error.kind(), ErrorKind::DataIntegrity);
    }

    #[test]
    fn test_invalid_input_kinds() {
        assert_eq!(
            PackError::InvalidArgument("x".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            PackError::MissingLaunchDir("/launch".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            PackError::MissingDescriptor("metadata.toml".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            PackError::InvalidTargetPath("../etc".into()).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_storage_kinds() {
        assert_eq!(PackError::Layer("x".into()).kind(), ErrorKind::Storage);
        assert_eq!(PackError::OciImage("x".into()).kind(), ErrorKind::Storage);
        assert_eq!(PackError::Store("x".into()).kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let pack_error: PackError = io_error.into();
        assert!(matches!(pack_error, PackError::Io(_)));
        assert!(pack_error.to_string().contains("file not found"));
        assert_eq!(pack_error.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ invalid");
        let pack_error: PackError = result.unwrap_err().into();
        assert!(matches!(pack_error, PackError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let result: std::result::Result<toml::Table, _> = toml::from_str("key = ");
        let pack_error: PackError = result.unwrap_err().into();
        assert!(matches!(pack_error, PackError::Serialization(_)));
    }
}
