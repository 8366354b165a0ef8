//! The deployment record: what is deployed where, and with which interface.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ledgerline_core::document::{read_json_or_default, write_json};
use ledgerline_executor::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::DeployResult;

/// A deployed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub address: Address,
    /// Artifact the resource was built from.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn: Option<String>,
}

/// Interface of an artifact that has been deployed at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub abi: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,
    #[serde(default)]
    pub sources: BTreeMap<String, Source>,
}

impl DeploymentRecord {
    /// Recorded, non-empty address of `name`.
    #[must_use]
    pub fn address_of(&self, name: &str) -> Option<&Address> {
        self.targets
            .get(name)
            .map(|target| &target.address)
            .filter(|address| !address.is_empty())
    }

    /// Interface descriptor of the artifact `name` was deployed from.
    #[must_use]
    pub fn abi_of(&self, name: &str) -> Option<&Value> {
        self.targets
            .get(name)
            .and_then(|target| self.sources.get(&target.source))
            .map(|source| &source.abi)
    }

    /// Names with a recorded address, in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets
            .values()
            .filter(|target| !target.address.is_empty())
            .map(|target| target.name.as_str())
    }

    pub fn upsert(&mut self, target: Target, abi: Value) {
        self.sources
            .insert(target.source.clone(), Source { abi });
        self.targets.insert(target.name.clone(), target);
    }
}

/// A [`DeploymentRecord`] bound to the file it is flushed to.
#[derive(Debug, Default)]
pub struct RecordStore {
    path: Option<PathBuf>,
    record: DeploymentRecord,
}

impl RecordStore {
    /// Load the record at `path`, starting empty if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> DeployResult<Self> {
        let path = path.into();
        let record: DeploymentRecord = read_json_or_default(&path)?;
        debug!(path = %path.display(), targets = record.targets.len(), "Loaded deployment record");
        Ok(Self {
            path: Some(path),
            record,
        })
    }

    /// A record that is never written anywhere.
    pub fn in_memory(record: DeploymentRecord) -> Self {
        Self { path: None, record }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub const fn record(&self) -> &DeploymentRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut DeploymentRecord {
        &mut self.record
    }

    /// Rewrite the backing file with the current record.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be written.
    pub fn flush(&self) -> DeployResult<()> {
        if let Some(path) = &self.path {
            write_json(path, &self.record)?;
            debug!(path = %path.display(), "Flushed deployment record");
        }
        Ok(())
    }
}
