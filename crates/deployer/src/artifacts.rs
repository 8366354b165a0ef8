//! Compiled artifacts: interface descriptor plus bytecode, keyed by name.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ledgerline_core::document::read_json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DeployError, DeployResult};

/// One compiled artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Interface descriptor: a JSON list of function entries.
    pub abi: Value,
    pub bytecode: String,
}

impl Artifact {
    pub fn new(abi: Value, bytecode: impl Into<String>) -> Self {
        Self {
            abi,
            bytecode: bytecode.into(),
        }
    }
}

/// Whether an interface descriptor declares a function called `name`.
#[must_use]
pub fn abi_has_function(abi: &Value, name: &str) -> bool {
    abi.as_array().is_some_and(|entries| {
        entries.iter().any(|entry| {
            entry.get("name").and_then(Value::as_str) == Some(name)
                && entry
                    .get("type")
                    .and_then(Value::as_str)
                    .map_or(true, |kind| kind == "function")
        })
    })
}

/// Read-only lookup of artifacts by name.
pub trait ArtifactRegistry: Send + Sync {
    /// Load `name`, or `None` when no such artifact was built.
    ///
    /// # Errors
    ///
    /// Returns an error when the artifact exists but cannot be decoded.
    fn load(&self, name: &str) -> DeployResult<Option<Artifact>>;

    /// # Errors
    ///
    /// Same as [`ArtifactRegistry::load`].
    fn contains(&self, name: &str) -> DeployResult<bool> {
        self.load(name).map(|artifact| artifact.is_some())
    }
}

/// Artifacts stored as `<build_dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FsArtifactRegistry {
    build_dir: PathBuf,
}

impl FsArtifactRegistry {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
        }
    }
}

impl ArtifactRegistry for FsArtifactRegistry {
    fn load(&self, name: &str) -> DeployResult<Option<Artifact>> {
        let path = self.build_dir.join(format!("{name}.json"));
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path)
            .map(Some)
            .map_err(|e| DeployError::InvalidArtifact {
                artifact: name.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Artifacts held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifacts {
    artifacts: BTreeMap<String, Artifact>,
}

impl InMemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, artifact: Artifact) -> Self {
        self.artifacts.insert(name.into(), artifact);
        self
    }
}

impl ArtifactRegistry for InMemoryArtifacts {
    fn load(&self, name: &str) -> DeployResult<Option<Artifact>> {
        Ok(self.artifacts.get(name).cloned())
    }
}
