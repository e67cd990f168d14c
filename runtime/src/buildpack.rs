//! Buildpack resolution: installed buildpacks, groups and orders.
//!
//! Installed buildpacks live at `<dir>/<id>/<version>/buildpack.toml`.
//! Group and order documents reference them by id and optional version;
//! a reference without a version means `latest`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use a3s_pack_core::error::{PackError, Result};
use serde::{Deserialize, Serialize};

const LATEST: &str = "latest";

/// An installed buildpack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buildpack {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Directory holding `buildpack.toml`
    #[serde(skip)]
    pub dir: PathBuf,
}

/// A reference to a buildpack inside a group document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum BuildpackRef {
    /// `"id@version"` or `"id"`
    Short(String),
    /// `{ id = "...", version = "..." }`
    Full {
        id: String,
        #[serde(default)]
        version: Option<String>,
    },
}

impl BuildpackRef {
    fn id(&self) -> &str {
        match self {
            BuildpackRef::Short(s) => s.split_once('@').map(|(id, _)| id).unwrap_or(s.as_str()),
            BuildpackRef::Full { id, .. } => id.as_str(),
        }
    }

    fn version(&self) -> &str {
        let version = match self {
            BuildpackRef::Short(s) => s.split_once('@').map(|(_, v)| v),
            BuildpackRef::Full { version, .. } => version.as_deref(),
        };
        version.filter(|v| !v.is_empty()).unwrap_or(LATEST)
    }

    fn key(&self) -> String {
        format!("{}@{}", self.id(), self.version())
    }
}

#[derive(Debug, Default, Deserialize)]
struct GroupDocument {
    #[serde(default)]
    repository: String,
    #[serde(default)]
    buildpacks: Vec<BuildpackRef>,
}

#[derive(Debug, Default, Deserialize)]
struct OrderDocument {
    #[serde(default)]
    groups: Vec<GroupDocument>,
}

/// An ordered set of buildpacks that run together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildpackGroup {
    pub repository: String,
    pub buildpacks: Vec<Buildpack>,
}

impl BuildpackGroup {
    pub fn ids(&self) -> Vec<String> {
        self.buildpacks.iter().map(|bp| bp.id.clone()).collect()
    }
}

/// Candidate groups, in preference order.
pub type BuildpackOrder = Vec<BuildpackGroup>;

/// Installed buildpacks keyed by `id@version`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildpackMap(BTreeMap<String, Buildpack>);

impl BuildpackMap {
    /// Scan `<dir>/<id>/<version>/buildpack.toml`.
    ///
    /// Version directories without a `buildpack.toml` are skipped.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let read_err = |path: &Path, e: std::io::Error| {
            PackError::InvalidArgument(format!(
                "Failed to read buildpacks directory {}: {}",
                path.display(),
                e
            ))
        };

        let mut map = BTreeMap::new();
        for id_entry in std::fs::read_dir(dir).map_err(|e| read_err(dir, e))? {
            let id_dir = id_entry.map_err(|e| read_err(dir, e))?.path();
            if !id_dir.is_dir() {
                continue;
            }
            for version_entry in std::fs::read_dir(&id_dir).map_err(|e| read_err(&id_dir, e))? {
                let version_dir = version_entry.map_err(|e| read_err(&id_dir, e))?.path();
                let descriptor = version_dir.join("buildpack.toml");
                if !descriptor.is_file() {
                    continue;
                }

                let content = std::fs::read_to_string(&descriptor).map_err(|e| read_err(&descriptor, e))?;
                let mut buildpack: Buildpack =
                    toml::from_str(&content).map_err(|e| PackError::Descriptor {
                        path: descriptor.display().to_string(),
                        message: e.to_string(),
                    })?;
                buildpack.dir = version_dir;

                let key = format!("{}@{}", buildpack.id, buildpack.version);
                map.insert(key, buildpack);
            }
        }

        tracing::debug!(path = %dir.display(), buildpacks = map.len(), "Loaded buildpacks");
        Ok(Self(map))
    }

    pub fn insert(&mut self, key: impl Into<String>, buildpack: Buildpack) {
        self.0.insert(key.into(), buildpack);
    }

    pub fn get(&self, key: &str) -> Option<&Buildpack> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read a `{ repository, buildpacks = [...] }` group document.
    pub fn read_group(&self, path: &Path) -> Result<BuildpackGroup> {
        let document: GroupDocument = read_document(path)?;
        Ok(self.resolve_group(document))
    }

    /// Read a `{ groups = [...] }` order document.
    pub fn read_order(&self, path: &Path) -> Result<BuildpackOrder> {
        let document: OrderDocument = read_document(path)?;
        Ok(document
            .groups
            .into_iter()
            .map(|group| self.resolve_group(group))
            .collect())
    }

    fn resolve_group(&self, document: GroupDocument) -> BuildpackGroup {
        let buildpacks = document
            .buildpacks
            .iter()
            .filter_map(|reference| {
                let key = reference.key();
                let found = self.0.get(&key).cloned();
                if found.is_none() {
                    tracing::warn!(buildpack = %key, "Buildpack not installed, dropping from group");
                }
                found
            })
            .collect();

        BuildpackGroup {
            repository: document.repository,
            buildpacks,
        }
    }
}

/// Ordered buildpack ids of a group document, without resolving them.
pub fn read_group_ids(path: &Path) -> Result<Vec<String>> {
    let document: GroupDocument = read_document(path)?;
    Ok(document
        .buildpacks
        .iter()
        .map(|reference| reference.id().to_string())
        .collect())
}

fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PackError::MissingDescriptor(path.display().to_string())
        } else {
            PackError::InvalidArgument(format!("Failed to read {}: {}", path.display(), e))
        }
    })?;
    toml::from_str(&content).map_err(|e| PackError::Descriptor {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
