//! End-to-end run: plan, deploy, configure, reconcile.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledgerline_core::Config;
use ledgerline_deployer::{
    Accounts, ArtifactRegistry, DeployReport, DeploymentCoordinator, DeploymentRecord, RecordStore,
    StepRunner, StepsReport,
};
use ledgerline_executor::{ExecutorStats, StepExecutor};
use ledgerline_planner::{DependencyPlanner, DeploymentPlan, Manifest};
use tracing::{info, warn};
use ulid::Ulid;

use crate::error::Result;
use crate::registry::{RegistryReconciler, RegistryReconcilerConfig, RegistryReport};
use crate::snapshot::{SnapshotReconciler, SnapshotReconcilerConfig, SnapshotReport};

/// Which reconcilers a run includes.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub registry: Option<RegistryReconcilerConfig>,
    pub snapshot: Option<SnapshotReconcilerConfig>,
    pub explorer_url: Option<String>,
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            registry: (!config.registry.resource.is_empty())
                .then(|| RegistryReconcilerConfig::from(&config.registry)),
            snapshot: (!config.snapshot.resource.is_empty())
                .then(|| SnapshotReconcilerConfig::from(&config.snapshot)),
            explorer_url: config.explorer_url.clone(),
        }
    }
}

/// Everything one run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Ulid,
    pub started_at: DateTime<Utc>,
    pub deploy: DeployReport,
    pub steps: StepsReport,
    pub registry: Option<RegistryReport>,
    pub snapshot: Option<SnapshotReport>,
    pub stats: ExecutorStats,
}

impl RunReport {
    /// The registry import is waiting for the owner.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.registry
            .as_ref()
            .is_some_and(RegistryReport::is_halted)
    }

    /// Total writes submitted, deployments included.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.stats.submitted + self.deploy.deployed.len()
    }
}

/// Plan for `manifest`, treating recorded but undeclared resources as
/// already satisfied dependencies.
///
/// # Errors
///
/// Returns configuration errors from the planner.
pub fn plan(manifest: &Manifest, record: &DeploymentRecord) -> Result<DeploymentPlan> {
    let legacy = record
        .names()
        .filter(|name| !manifest.resources.iter().any(|spec| spec.name == *name));
    Ok(DependencyPlanner::new()
        .with_legacy(legacy)
        .plan(&manifest.resources)?)
}

/// The whole deploy-and-reconcile sequence.
pub struct Pipeline {
    executor: Arc<StepExecutor>,
    artifacts: Arc<dyn ArtifactRegistry>,
    accounts: Accounts,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        executor: Arc<StepExecutor>,
        artifacts: Arc<dyn ArtifactRegistry>,
        accounts: Accounts,
        config: PipelineConfig,
    ) -> Self {
        Self {
            executor,
            artifacts,
            accounts,
            config,
        }
    }

    /// Run every phase in order.
    ///
    /// A registry import that needs the owner ends the run early without an
    /// error; the snapshot phase is then skipped.
    ///
    /// # Errors
    ///
    /// Returns the first configuration, backend, consistency or storage
    /// error.
    pub async fn run(&self, manifest: &Manifest, store: &mut RecordStore) -> Result<RunReport> {
        let run_id = Ulid::new();
        let started_at = Utc::now();
        info!(run_id = %run_id, dry_run = self.executor.is_dry_run(), "Starting run");

        let plan = plan(manifest, store.record())?;
        let deploy = DeploymentCoordinator::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.artifacts),
            self.accounts.clone(),
        )
        .with_explorer_url(self.config.explorer_url.clone())
        .run(&plan, manifest, store)
        .await?;

        let steps = StepRunner::new(Arc::clone(&self.executor), self.accounts.clone())
            .run(manifest, store.record())
            .await?;

        let mut report = RunReport {
            run_id,
            started_at,
            deploy,
            steps,
            registry: None,
            snapshot: None,
            stats: ExecutorStats::default(),
        };

        report.registry = self.sync_registry(store.record()).await?;
        if report.is_halted() {
            warn!(run_id = %run_id, "Run halted waiting for the owner");
        } else {
            report.snapshot = self.refresh_snapshot(store.record()).await?;
        }

        report.stats = self.executor.stats();
        info!(
            run_id = %run_id,
            deployed = report.deploy.deployed.len(),
            submitted = report.stats.submitted,
            queued = report.stats.queued,
            "Run complete"
        );
        Ok(report)
    }

    /// Registry phase alone; `None` when no registry is configured or
    /// recorded.
    ///
    /// # Errors
    ///
    /// See [`RegistryReconciler::reconcile`].
    pub async fn sync_registry(&self, record: &DeploymentRecord) -> Result<Option<RegistryReport>> {
        let Some(config) = &self.config.registry else {
            return Ok(None);
        };
        if record.address_of(&config.resource).is_none() {
            warn!(registry = %config.resource, "Registry not deployed, skipping sync");
            return Ok(None);
        }
        RegistryReconciler::new(Arc::clone(&self.executor), config.clone())
            .reconcile(record)
            .await
            .map(Some)
    }

    /// Snapshot phase alone; `None` when no snapshot resource is configured
    /// or recorded.
    ///
    /// # Errors
    ///
    /// See [`SnapshotReconciler::reconcile`].
    pub async fn refresh_snapshot(&self, record: &DeploymentRecord) -> Result<Option<SnapshotReport>> {
        let Some(config) = &self.config.snapshot else {
            return Ok(None);
        };
        if record.address_of(&config.resource).is_none() {
            warn!(resource = %config.resource, "Snapshot resource not deployed, skipping");
            return Ok(None);
        }
        SnapshotReconciler::new(Arc::clone(&self.executor), config.clone())
            .reconcile(record)
            .await
            .map(Some)
    }
}
