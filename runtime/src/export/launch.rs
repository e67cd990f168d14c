//! Launch directory reader.
//!
//! ```text
//! launch/
//! ├── app/                       (application tree, always the app layer)
//! │   └── metadata.toml          (processes = [{ type, command }])
//! └── <buildpack-id>/
//!     ├── <layer>.toml           (layer descriptor, marks a candidate)
//!     └── <layer>/               (optional; present means write fresh)
//! ```

use std::path::{Component, Path, PathBuf};

use a3s_pack_core::error::{PackError, Result};
use serde::Deserialize;
use serde_json::Value;

/// Descriptor name reserved for launch configuration, never a layer.
const RESERVED_LAYER_NAME: &str = "launch";

/// A validated launch directory.
#[derive(Debug, Clone)]
pub struct LaunchDir {
    root: PathBuf,
}

/// A `<layer>.toml` descriptor found under a buildpack directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerCandidate {
    /// Logical layer name (descriptor file stem)
    pub name: String,
    /// Path of the descriptor file
    pub descriptor: PathBuf,
    /// Path of the sibling layer directory
    pub dir: PathBuf,
    /// Whether the sibling directory exists
    pub has_dir: bool,
}

impl LaunchDir {
    /// Open a launch directory, checking the app tree and its process
    /// metadata exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        if !root.is_dir() {
            return Err(PackError::MissingLaunchDir(root.display().to_string()));
        }
        let launch = Self { root };
        if !launch.app_dir().is_dir() {
            return Err(PackError::MissingLaunchDir(
                launch.app_dir().display().to_string(),
            ));
        }
        if !launch.app_metadata_path().is_file() {
            return Err(PackError::MissingDescriptor(
                launch.app_metadata_path().display().to_string(),
            ));
        }
        Ok(launch)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn app_dir(&self) -> PathBuf {
        self.root.join("app")
    }

    pub fn app_metadata_path(&self) -> PathBuf {
        self.app_dir().join("metadata.toml")
    }

    /// Layer descriptors of `buildpack_id`, in lexical order.
    ///
    /// A buildpack without a directory contributes no candidates.
    pub fn layer_candidates(&self, buildpack_id: &str) -> Result<Vec<LayerCandidate>> {
        validate_buildpack_id(buildpack_id)?;
        let bp_dir = self.root.join(buildpack_id);
        if !bp_dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&bp_dir).map_err(|e| {
            PackError::Layer(format!(
                "Failed to read buildpack directory {}: {}",
                bp_dir.display(),
                e
            ))
        })?;

        let read_err = |path: &Path, e: std::io::Error| {
            PackError::Layer(format!("Failed to read {}: {}", path.display(), e))
        };

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| read_err(&bp_dir, e))?;
            let descriptor = entry.path();
            if descriptor.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            if !entry.file_type().map_err(|e| read_err(&descriptor, e))?.is_file() {
                continue;
            }
            let name = match descriptor.file_stem().and_then(|s| s.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if name == RESERVED_LAYER_NAME {
                continue;
            }

            let dir = bp_dir.join(&name);
            let has_dir = match std::fs::metadata(&dir) {
                Ok(meta) if meta.is_dir() => true,
                Ok(_) => return Err(PackError::NotADirectory(dir.display().to_string())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(read_err(&dir, e)),
            };

            candidates.push(LayerCandidate {
                name,
                descriptor,
                dir,
                has_dir,
            });
        }

        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(candidates)
    }
}

/// A buildpack id names exactly one directory below the launch root.
fn validate_buildpack_id(id: &str) -> Result<()> {
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(PackError::InvalidArgument(format!(
            "Invalid buildpack id: {:?}",
            id
        ))),
    }
}

/// One `[[processes]]` entry of the app metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Process {
    #[serde(rename = "type")]
    pub process_type: String,
    pub command: String,
}

/// Process declarations written by the build step into `app/metadata.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaunchMetadata {
    #[serde(default)]
    pub processes: Vec<Process>,
    #[serde(skip)]
    path: PathBuf,
}

impl LaunchMetadata {
    pub fn read(path: &Path) -> Result<Self> {
        let content = read_descriptor(path)?;
        let mut metadata: LaunchMetadata =
            toml::from_str(&content).map_err(|e| PackError::Descriptor {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        metadata.path = path.to_path_buf();
        Ok(metadata)
    }

    /// Command of the first process with type `web`.
    pub fn web_command(&self) -> Result<&str> {
        self.processes
            .iter()
            .find(|p| p.process_type == "web")
            .map(|p| p.command.as_str())
            .ok_or_else(|| PackError::MissingWebProcess(self.path.display().to_string()))
    }
}

/// Parse a layer descriptor into free-form data.
///
/// Datetimes become their RFC 3339 string form.
pub fn read_layer_data(path: &Path) -> Result<Value> {
    let content = read_descriptor(path)?;
    let table: toml::Table = toml::from_str(&content).map_err(|e| PackError::Descriptor {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(toml_to_json(toml::Value::Table(table)))
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}

fn read_descriptor(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PackError::MissingDescriptor(path.display().to_string())
        } else {
            PackError::Layer(format!("Failed to read {}: {}", path.display(), e))
        }
    })
}
