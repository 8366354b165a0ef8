//! Declarative post-deployment configuration steps.

use std::sync::Arc;

use ledgerline_executor::{ReadProbe, StepExecutor, StepOutcome, StepRequest, StepTarget, WriteCall};
use ledgerline_planner::{Manifest, StepSpec};
use tracing::info;

use crate::error::{DeployError, DeployResult};
use crate::record::DeploymentRecord;
use crate::resolve::{Accounts, ArgResolver};

/// Outcome of one configuration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub target: String,
    pub call: String,
    pub outcome: StepOutcome,
}

/// Result of [`StepRunner::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepsReport {
    pub steps: Vec<StepResult>,
}

impl StepsReport {
    #[must_use]
    pub fn queued(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_queued()).count()
    }

    #[must_use]
    pub fn submitted(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_submitted()).count()
    }
}

/// Runs the manifest's configuration steps through the executor.
pub struct StepRunner {
    executor: Arc<StepExecutor>,
    accounts: Accounts,
}

impl StepRunner {
    pub fn new(executor: Arc<StepExecutor>, accounts: Accounts) -> Self {
        Self { executor, accounts }
    }

    /// Build a request for every step.
    ///
    /// # Errors
    ///
    /// Fails when a step targets a resource without an address or one of
    /// its arguments cannot be resolved.
    pub fn requests(
        &self,
        steps: &[StepSpec],
        manifest: &Manifest,
        record: &DeploymentRecord,
    ) -> DeployResult<Vec<StepRequest>> {
        let resolver = ArgResolver::new(record, &manifest.params, &self.accounts);
        steps
            .iter()
            .map(|step| {
                let address = record
                    .address_of(&step.target)
                    .ok_or_else(|| DeployError::UnknownStepTarget(step.target.clone()))?;
                let write = WriteCall::new(
                    step.write.function.clone(),
                    resolver.resolve_all(&step.target, &step.write.args)?,
                );
                let mut request =
                    StepRequest::new(StepTarget::new(step.target.clone(), address.clone()), write);
                if let Some(read) = &step.read {
                    request = request.with_probe(ReadProbe::equals(
                        read.function.clone(),
                        resolver.resolve_all(&step.target, &read.args)?,
                        resolver.resolve(&step.target, &read.expect)?,
                    ));
                }
                if step.public {
                    request = request.public();
                }
                Ok(request)
            })
            .collect()
    }

    /// Ensure every configuration step of `manifest`.
    ///
    /// All requests are built before the first probe, so a bad step fails
    /// the phase without side effects.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from [`StepRunner::requests`] and any
    /// executor failure.
    pub async fn run(&self, manifest: &Manifest, record: &DeploymentRecord) -> DeployResult<StepsReport> {
        if manifest.steps.is_empty() {
            return Ok(StepsReport::default());
        }
        let requests = self.requests(&manifest.steps, manifest, record)?;
        let labels: Vec<(String, String)> = requests
            .iter()
            .map(|r| (r.target.name.clone(), r.write.signature()))
            .collect();

        let outcomes = self.executor.ensure_all(requests).await?;
        let report = StepsReport {
            steps: labels
                .into_iter()
                .zip(outcomes)
                .map(|((target, call), outcome)| StepResult {
                    target,
                    call,
                    outcome,
                })
                .collect(),
        };

        info!(
            steps = report.steps.len(),
            submitted = report.submitted(),
            queued = report.queued(),
            "Configuration steps complete"
        );
        Ok(report)
    }
}
