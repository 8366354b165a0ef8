//! Deploy-or-reuse decisions and sequential deployment.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use ledgerline_executor::{Address, StepExecutor, TxId};
use ledgerline_planner::{DeploymentPlan, Manifest, ResourceSpec};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::artifacts::{Artifact, ArtifactRegistry};
use crate::error::{DeployError, DeployResult};
use crate::record::{DeploymentRecord, RecordStore, Target};
use crate::resolve::{Accounts, ArgResolver};

/// Why a resource is being deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployReason {
    /// `force` was set on the resource.
    Forced,
    /// The resource configuration asks for a deployment.
    Configured,
    /// Nothing is recorded for the resource yet.
    Fresh,
}

/// What happens to one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Deploy(DeployReason),
    Reuse(Address),
}

/// Decide whether `spec` is deployed or reused.
///
/// `flag` is the resource's explicit `deploy` setting, if any.
///
/// # Errors
///
/// Returns [`DeployError::MissingReuseAddress`] when the resource is marked
/// for reuse but nothing is recorded for it.
pub fn decide(
    spec: &ResourceSpec,
    flag: Option<bool>,
    record: &DeploymentRecord,
) -> DeployResult<Decision> {
    let recorded = record.address_of(&spec.name);
    match (spec.force_redeploy, flag, recorded) {
        (true, _, _) => Ok(Decision::Deploy(DeployReason::Forced)),
        (false, Some(false), Some(address)) => Ok(Decision::Reuse(address.clone())),
        (false, Some(false), None) => Err(DeployError::MissingReuseAddress(spec.name.clone())),
        (false, Some(true), _) => Ok(Decision::Deploy(DeployReason::Configured)),
        (false, None, Some(address)) => Ok(Decision::Reuse(address.clone())),
        (false, None, None) => Ok(Decision::Deploy(DeployReason::Fresh)),
    }
}

/// Address used for a resource in dry-run mode.
///
/// Derived from the name alone so repeated dry runs agree.
#[must_use]
pub fn synthetic_address(name: &str) -> Address {
    let digest = Sha256::digest(name.as_bytes());
    Address::new(format!("0x{}", &hex::encode(digest)[..40]))
}

/// A resource deployed during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedResource {
    pub name: String,
    pub address: Address,
    pub reason: DeployReason,
    pub id: TxId,
}

/// Result of [`DeploymentCoordinator::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub deployed: Vec<DeployedResource>,
    pub reused: Vec<(String, Address)>,
}

impl DeployReport {
    /// Whether `name` was deployed during this run.
    #[must_use]
    pub fn is_newly_deployed(&self, name: &str) -> bool {
        self.deployed.iter().any(|resource| resource.name == name)
    }
}

struct Prepared<'a> {
    spec: &'a ResourceSpec,
    decision: Decision,
    artifact: Option<Artifact>,
}

/// Walks a plan, deploying or reusing every resource in order.
pub struct DeploymentCoordinator {
    executor: Arc<StepExecutor>,
    artifacts: Arc<dyn ArtifactRegistry>,
    accounts: Accounts,
    explorer_url: Option<String>,
}

impl DeploymentCoordinator {
    pub fn new(
        executor: Arc<StepExecutor>,
        artifacts: Arc<dyn ArtifactRegistry>,
        accounts: Accounts,
    ) -> Self {
        Self {
            executor,
            artifacts,
            accounts,
            explorer_url: None,
        }
    }

    #[must_use]
    pub fn with_explorer_url(mut self, explorer_url: Option<String>) -> Self {
        self.explorer_url = explorer_url;
        self
    }

    /// Deploy or reuse every resource in `plan`.
    ///
    /// All decisions, artifact lookups and parameter checks happen before the
    /// first submission. After each deployment the record is flushed, except
    /// in dry-run mode where it is only updated in memory.
    ///
    /// # Errors
    ///
    /// Configuration errors are returned before any backend call. A backend
    /// failure stops the run; resources deployed before it stay recorded.
    #[instrument(skip_all, fields(resources = plan.len()))]
    pub async fn run(
        &self,
        plan: &DeploymentPlan,
        manifest: &Manifest,
        store: &mut RecordStore,
    ) -> DeployResult<DeployReport> {
        let prepared = self.preflight(plan, manifest, store.record())?;
        let mut report = DeployReport::default();

        for item in prepared {
            match (item.decision, item.artifact) {
                (Decision::Reuse(address), _) => {
                    debug!(resource = %item.spec.name, address = %address, "Reusing resource");
                    report.reused.push((item.spec.name.clone(), address));
                }
                (Decision::Deploy(reason), Some(artifact)) => {
                    let deployed = self
                        .deploy_one(item.spec, reason, &artifact, &manifest.params, store)
                        .await?;
                    report.deployed.push(deployed);
                }
                (Decision::Deploy(_), None) => {
                    return Err(DeployError::missing_artifact(
                        &item.spec.name,
                        &item.spec.artifact_name,
                    ));
                }
            }
        }

        info!(
            deployed = report.deployed.len(),
            reused = report.reused.len(),
            "Deployment phase complete"
        );
        Ok(report)
    }

    fn preflight<'a>(
        &self,
        plan: &'a DeploymentPlan,
        manifest: &Manifest,
        record: &DeploymentRecord,
    ) -> DeployResult<Vec<Prepared<'a>>> {
        let resolver = ArgResolver::new(record, &manifest.params, &self.accounts);
        plan.iter()
            .map(|spec| {
                let decision = decide(spec, manifest.deploy_flag(&spec.name), record)?;
                let artifact = match decision {
                    Decision::Reuse(_) => None,
                    Decision::Deploy(_) => {
                        resolver.check_params(&spec.name, &spec.constructor_args)?;
                        let artifact = self.artifacts.load(&spec.artifact_name)?.ok_or_else(|| {
                            DeployError::missing_artifact(&spec.name, &spec.artifact_name)
                        })?;
                        Some(artifact)
                    }
                };
                Ok(Prepared {
                    spec,
                    decision,
                    artifact,
                })
            })
            .collect()
    }

    async fn deploy_one(
        &self,
        spec: &ResourceSpec,
        reason: DeployReason,
        artifact: &Artifact,
        params: &BTreeMap<String, Value>,
        store: &mut RecordStore,
    ) -> DeployResult<DeployedResource> {
        let args = ArgResolver::new(store.record(), params, &self.accounts)
            .resolve_all(&spec.name, &spec.constructor_args)?;

        info!(resource = %spec.name, artifact = %spec.artifact_name, reason = ?reason, "Deploying resource");
        let receipt = self
            .executor
            .deploy(&spec.artifact_name, &artifact.bytecode, args)
            .await?;

        let address = match receipt.contract_address {
            Some(address) => address,
            None if self.executor.is_dry_run() => synthetic_address(&spec.name),
            None => return Err(DeployError::NoContractAddress(spec.name.clone())),
        };

        let txn = match &receipt.id {
            TxId::Hash(hash) => Some(hash.clone()),
            TxId::DryRun(_) => None,
        };
        store.record_mut().upsert(
            Target {
                name: spec.name.clone(),
                address: address.clone(),
                source: spec.artifact_name.clone(),
                link: self
                    .explorer_url
                    .as_deref()
                    .map(|explorer| format!("{explorer}/address/{address}")),
                timestamp: Utc::now(),
                txn,
            },
            artifact.abi.clone(),
        );
        if !self.executor.is_dry_run() {
            store.flush()?;
        }

        info!(resource = %spec.name, address = %address, id = %receipt.id, "Deployed resource");
        Ok(DeployedResource {
            name: spec.name.clone(),
            address,
            reason,
            id: receipt.id,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    fn record_with(name: &str, address: &str) -> DeploymentRecord {
        let mut record = DeploymentRecord::default();
        record.upsert(
            Target {
                name: name.to_string(),
                address: Address::new(address),
                source: name.to_string(),
                link: None,
                timestamp: Utc::now(),
                txn: None,
            },
            json!([]),
        );
        record
    }

    #[test]
    fn test_decision_table() {
        let spec = ResourceSpec::new("Token", "Token");
        let forced = ResourceSpec::new("Token", "Token").forced();
        let recorded = record_with("Token", "0x01");
        let empty = DeploymentRecord::default();

        assert_eq!(
            decide(&forced, Some(false), &recorded).unwrap(),
            Decision::Deploy(DeployReason::Forced)
        );
        assert_eq!(
            decide(&spec, Some(false), &recorded).unwrap(),
            Decision::Reuse(Address::new("0x01"))
        );
        assert!(matches!(
            decide(&spec, Some(false), &empty),
            Err(DeployError::MissingReuseAddress(_))
        ));
        assert_eq!(
            decide(&spec, Some(true), &recorded).unwrap(),
            Decision::Deploy(DeployReason::Configured)
        );
        assert_eq!(
            decide(&spec, None, &recorded).unwrap(),
            Decision::Reuse(Address::new("0x01"))
        );
        assert_eq!(
            decide(&spec, None, &empty).unwrap(),
            Decision::Deploy(DeployReason::Fresh)
        );
    }

    #[test]
    fn test_empty_recorded_address_counts_as_missing() {
        let spec = ResourceSpec::new("Token", "Token");
        let blank = record_with("Token", "");
        assert!(decide(&spec, Some(false), &blank).is_err());
        assert_eq!(
            decide(&spec, None, &blank).unwrap(),
            Decision::Deploy(DeployReason::Fresh)
        );
    }

    #[test]
    fn test_synthetic_address_is_stable() {
        let a = synthetic_address("Token");
        assert_eq!(a, synthetic_address("Token"));
        assert_ne!(a, synthetic_address("Proxy"));
        assert_eq!(a.as_str().len(), 42);
    }
}
