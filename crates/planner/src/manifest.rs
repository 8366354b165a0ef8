//! Input manifests for a deployment directory.
//!
//! - `deployment.json`: ordered list of [`ResourceSpec`]s
//! - `config.json`: `name -> {"deploy": bool}`
//! - `params.json`: `[{"name": .., "value": ..}]` constructor/step overrides
//! - `steps.json`: ordered list of [`StepSpec`] configuration steps
//!
//! Only `deployment.json` is mandatory; the others default to empty.

use std::collections::BTreeMap;
use std::path::Path;

use ledgerline_core::document::{read_json, read_json_or_default};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{PlanError, PlanResult};
use crate::spec::{ArgSpec, ResourceSpec};

/// Per-resource entry of `config.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployFlag {
    pub deploy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ParamEntry {
    name: String,
    value: Value,
}

/// A function call written in a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSpec {
    pub function: String,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
}

/// A read whose result must equal `expect` for the step to be satisfied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSpec {
    pub function: String,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    pub expect: ArgSpec,
}

/// One declarative "ensure" step run after deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub target: String,
    #[serde(default)]
    pub read: Option<ProbeSpec>,
    pub write: CallSpec,
    #[serde(default)]
    pub public: bool,
}

/// Locations of the manifest documents.
#[derive(Debug, Clone)]
pub struct ManifestPaths<'a> {
    pub deployment: &'a Path,
    pub config: &'a Path,
    pub params: &'a Path,
    pub steps: &'a Path,
}

/// Everything a run is told to do, loaded and validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub resources: Vec<ResourceSpec>,
    pub resource_config: BTreeMap<String, DeployFlag>,
    pub params: BTreeMap<String, Value>,
    pub steps: Vec<StepSpec>,
}

impl Manifest {
    /// Load all manifest documents.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Manifest`] for unreadable or malformed documents
    /// and [`PlanError::DuplicateParam`] when an override is declared twice.
    pub fn load(paths: &ManifestPaths<'_>) -> PlanResult<Self> {
        let resources: Vec<ResourceSpec> = read_json(paths.deployment)?;
        let resource_config: BTreeMap<String, DeployFlag> = read_json_or_default(paths.config)?;
        let param_entries: Vec<ParamEntry> = read_json_or_default(paths.params)?;
        let steps: Vec<StepSpec> = read_json_or_default(paths.steps)?;

        let mut params = BTreeMap::new();
        for entry in param_entries {
            if params.insert(entry.name.clone(), entry.value).is_some() {
                return Err(PlanError::DuplicateParam(entry.name));
            }
        }

        debug!(
            resources = resources.len(),
            overrides = resource_config.len(),
            params = params.len(),
            steps = steps.len(),
            "manifest loaded"
        );

        Ok(Self {
            resources,
            resource_config,
            params,
            steps,
        })
    }

    /// The explicit deploy flag for `name`, if `config.json` has one.
    #[must_use]
    pub fn deploy_flag(&self, name: &str) -> Option<bool> {
        self.resource_config.get(name).map(|flag| flag.deploy)
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).expect("seed manifest");
        path
    }

    #[test]
    fn test_load_with_only_deployment_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deployment = write(
            dir.path(),
            "deployment.json",
            r#"[{"name":"SafeMath","source":"SafeMath"},
                {"name":"Issuer","source":"Issuer","args":[{"address_of":"SafeMath"}],"force":true}]"#,
        );
        let missing = dir.path().join("missing.json");

        let manifest = Manifest::load(&ManifestPaths {
            deployment: &deployment,
            config: &missing,
            params: &missing,
            steps: &missing,
        })
        .expect("load");

        assert_eq!(manifest.resources.len(), 2);
        assert!(manifest.resources[1].force_redeploy);
        assert!(manifest.resource_config.is_empty());
        assert_eq!(manifest.deploy_flag("Issuer"), None);
    }

    #[test]
    fn test_duplicate_param_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deployment = write(dir.path(), "deployment.json", "[]");
        let params = write(
            dir.path(),
            "params.json",
            r#"[{"name":"RATE","value":1},{"name":"RATE","value":2}]"#,
        );
        let missing = dir.path().join("missing.json");

        let result = Manifest::load(&ManifestPaths {
            deployment: &deployment,
            config: &missing,
            params: &params,
            steps: &missing,
        });

        assert!(matches!(result, Err(PlanError::DuplicateParam(name)) if name == "RATE"));
    }

    #[test]
    fn test_config_flags_and_steps_decode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deployment = write(dir.path(), "deployment.json", "[]");
        let config = write(dir.path(), "config.json", r#"{"Issuer":{"deploy":false}}"#);
        let steps = write(
            dir.path(),
            "steps.json",
            r#"[{"target":"Issuer","read":{"function":"rate","expect":{"param":"RATE"}},
                 "write":{"function":"setRate","args":[{"param":"RATE"}]}}]"#,
        );
        let missing = dir.path().join("missing.json");

        let manifest = Manifest::load(&ManifestPaths {
            deployment: &deployment,
            config: &config,
            params: &missing,
            steps: &steps,
        })
        .expect("load");

        assert_eq!(manifest.deploy_flag("Issuer"), Some(false));
        assert_eq!(manifest.steps.len(), 1);
        assert!(!manifest.steps[0].public);
        assert_eq!(manifest.steps[0].write.function, "setRate");
    }
}
