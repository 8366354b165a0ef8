//! Idempotent step execution.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::keys::{action_key, call_data};
use crate::ledger::PendingAction;
use crate::nonce::NonceSequencer;
use crate::strategy::OwnerActionStrategy;
use crate::types::{
    ActionKey, Address, ReadCall, ReadProbe, Receipt, StepOutcome, StepRequest, StepTarget, Submission,
    SubmissionKind, TxId, WriteCall,
};

/// Configuration for the step executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Account writes are sent from.
    pub account: Address,
    /// Never submit; hand out synthetic ids instead.
    pub dry_run: bool,
    /// Maximum concurrent probe reads in [`StepExecutor::ensure_all`].
    pub concurrency: usize,
    pub deploy_gas_limit: u64,
    pub method_call_gas_limit: u64,
    pub max_price_wei: u64,
    /// Block explorer base URL used for pending-action links.
    pub explorer_url: Option<String>,
}

impl ExecutorConfig {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            ..Self::default()
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            account: Address::default(),
            dry_run: false,
            concurrency: 8,
            deploy_gas_limit: 8_000_000,
            method_call_gas_limit: 500_000,
            max_price_wei: 100_000_000_000,
            explorer_url: None,
        }
    }
}

/// Counts of step outcomes, for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub noops: usize,
    pub submitted: usize,
    pub queued: usize,
}

#[derive(Debug, Default)]
struct Counters {
    noops: AtomicUsize,
    submitted: AtomicUsize,
    queued: AtomicUsize,
}

impl Counters {
    fn record(&self, outcome: &StepOutcome) {
        let counter = match outcome {
            StepOutcome::NoOp => &self.noops,
            StepOutcome::Submitted { .. } => &self.submitted,
            StepOutcome::Queued { .. } => &self.queued,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ExecutorStats {
        ExecutorStats {
            noops: self.noops.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
        }
    }
}

/// Turns "make sure X holds" requests into at most one write each.
///
/// A step whose read probe already holds sends nothing. Otherwise the write
/// is sent when the executing account owns the target (or the write is
/// public), and deferred through the [`OwnerActionStrategy`] when it does
/// not.
pub struct StepExecutor {
    backend: Arc<dyn Backend>,
    config: ExecutorConfig,
    strategy: Arc<dyn OwnerActionStrategy>,
    sequencer: Option<NonceSequencer>,
    write_lock: Mutex<()>,
    dry_run_ids: AtomicU64,
    counters: Counters,
}

impl StepExecutor {
    pub fn new(
        backend: Arc<dyn Backend>,
        config: ExecutorConfig,
        strategy: Arc<dyn OwnerActionStrategy>,
    ) -> Self {
        Self {
            backend,
            config,
            strategy,
            sequencer: None,
            write_lock: Mutex::new(()),
            dry_run_ids: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// Assign nonces client-side instead of letting the backend do it.
    #[must_use]
    pub fn with_nonce_sequencer(mut self) -> Self {
        self.sequencer = Some(NonceSequencer::new(self.config.account.clone()));
        self
    }

    #[must_use]
    pub fn account(&self) -> &Address {
        &self.config.account
    }

    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        self.counters.snapshot()
    }

    /// Plain read against the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    pub async fn read(&self, target: &Address, function: &str, args: Vec<Value>) -> Result<Value> {
        self.backend
            .call(&ReadCall::new(target.clone(), function, args))
            .await
    }

    /// Ensure one invariant holds.
    ///
    /// # Errors
    ///
    /// Returns an error on any backend failure, or when the owner-action
    /// strategy refuses to defer the write.
    #[instrument(skip(self, request), fields(resource = %request.target.name, function = %request.write.function))]
    pub async fn ensure(&self, request: StepRequest) -> Result<StepOutcome> {
        if self.probe_holds(&request).await? {
            return Ok(self.finish(&request, StepOutcome::NoOp));
        }
        self.apply(request).await
    }

    /// Ensure several invariants.
    ///
    /// Probes run concurrently, bounded by the configured concurrency. The
    /// writes still needed are then applied one by one in request order.
    /// Outcomes are returned in request order.
    ///
    /// # Errors
    ///
    /// Stops at the first failure.
    pub async fn ensure_all(&self, requests: Vec<StepRequest>) -> Result<Vec<StepOutcome>> {
        let satisfied: Vec<bool> = stream::iter(requests.iter())
            .map(|request| self.probe_holds(request))
            .buffered(self.concurrency())
            .try_collect()
            .await?;

        let pending = satisfied.iter().filter(|held| !**held).count();
        debug!(steps = requests.len(), pending, "Evaluated step probes");

        let mut outcomes = Vec::with_capacity(requests.len());
        for (request, held) in requests.into_iter().zip(satisfied) {
            let outcome = if held {
                self.finish(&request, StepOutcome::NoOp)
            } else {
                self.apply(request).await?
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Deploy compiled bytecode.
    ///
    /// In dry-run mode the receipt carries a synthetic id and no address.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the deployment.
    pub async fn deploy(&self, artifact: &str, bytecode: &str, args: Vec<Value>) -> Result<Receipt> {
        let kind = SubmissionKind::Deploy {
            artifact: artifact.to_string(),
            bytecode: bytecode.to_string(),
            args,
        };
        self.submit(kind, self.config.deploy_gas_limit).await
    }

    async fn probe_holds(&self, request: &StepRequest) -> Result<bool> {
        let Some(probe) = &request.read_probe else {
            return Ok(false);
        };
        let current = self.read_probe(&request.target, probe).await?;
        let held = probe.is_satisfied(&current);
        debug!(
            resource = %request.target.name,
            probe = %probe.function,
            expected = %probe.label,
            current = %current,
            held,
            "Checked step probe"
        );
        Ok(held)
    }

    async fn read_probe(&self, target: &StepTarget, probe: &ReadProbe) -> Result<Value> {
        self.read(&target.address, &probe.function, probe.args.clone())
            .await
    }

    async fn apply(&self, request: StepRequest) -> Result<StepOutcome> {
        let outcome = if self.is_authorized(&request).await? {
            let gas_limit = request
                .gas_limit
                .unwrap_or(self.config.method_call_gas_limit);
            let kind = SubmissionKind::Invoke {
                target: request.target.address.clone(),
                call: request.write.clone(),
            };
            let receipt = self.submit(kind, gas_limit).await?;
            info!(
                resource = %request.target.name,
                call = %request.write.signature(),
                id = %receipt.id,
                "Submitted step"
            );
            StepOutcome::Submitted { id: receipt.id }
        } else {
            let key = self.defer(&request.target, &request.write).await?;
            StepOutcome::Queued { key }
        };
        Ok(self.finish(&request, outcome))
    }

    async fn is_authorized(&self, request: &StepRequest) -> Result<bool> {
        if request.publicly_callable {
            return Ok(true);
        }
        let owner = match &request.owner_override {
            Some(owner) => owner.clone(),
            None => {
                let value = self
                    .read(&request.target.address, "owner", Vec::new())
                    .await?;
                Address::from_value(&value).ok_or_else(|| {
                    Error::invalid_response(
                        format!("owner() on {}", request.target.name),
                        format!("expected an address, got {value}"),
                    )
                })?
            }
        };
        Ok(owner == self.config.account)
    }

    async fn defer(&self, target: &StepTarget, call: &WriteCall) -> Result<ActionKey> {
        let key = action_key(&target.address, call)?;
        let action = PendingAction {
            target: target.name.clone(),
            action: call.signature(),
            complete: false,
            data: call_data(call)?,
            link: self
                .config
                .explorer_url
                .as_deref()
                .map(|explorer| format!("{explorer}/address/{}#writecontract", target.address)),
        };
        self.strategy.defer(&key, &action).await?;
        Ok(key)
    }

    async fn submit(&self, kind: SubmissionKind, gas_limit: u64) -> Result<Receipt> {
        if self.config.dry_run {
            let n = self.dry_run_ids.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(id = n, "Dry run, skipping submission");
            return Ok(Receipt {
                id: TxId::DryRun(n),
                contract_address: None,
            });
        }

        let mut submission = Submission {
            from: self.config.account.clone(),
            nonce: None,
            gas_limit,
            max_price_wei: self.config.max_price_wei,
            kind,
        };

        match &self.sequencer {
            Some(sequencer) => {
                submission.nonce = Some(sequencer.reserve(self.backend.as_ref()).await?);
                self.backend.submit(&submission).await
            }
            None => {
                let _guard = self.write_lock.lock().await;
                self.backend.submit(&submission).await
            }
        }
    }

    fn finish(&self, request: &StepRequest, outcome: StepOutcome) -> StepOutcome {
        if let StepOutcome::Queued { key } = &outcome {
            info!(
                resource = %request.target.name,
                call = %request.write.signature(),
                key = %key,
                "Queued step for owner"
            );
        }
        self.counters.record(&outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;
    use crate::ledger::PendingActionLedger;
    use crate::memory::InMemoryBackend;
    use crate::strategy::QueueForLater;

    const ME: &str = "0x00000000000000000000000000000000000000aa";
    const TARGET: &str = "0x0000000000000000000000000000000000000001";

    fn executor(backend: &InMemoryBackend, dry_run: bool) -> StepExecutor {
        let config = ExecutorConfig {
            dry_run,
            ..ExecutorConfig::new(Address::new(ME))
        };
        let ledger = Arc::new(PendingActionLedger::in_memory());
        StepExecutor::new(
            Arc::new(backend.clone()),
            config,
            Arc::new(QueueForLater::new(ledger)),
        )
    }

    fn set_rate(value: u64) -> StepRequest {
        StepRequest::new(
            StepTarget::new("Rates", Address::new(TARGET)),
            WriteCall::new("setRate", vec![json!(value)]),
        )
        .with_probe(ReadProbe::equals("rate", Vec::new(), json!(value)))
    }

    #[tokio::test]
    async fn test_missing_probe_always_writes() {
        let backend = InMemoryBackend::new();
        let target = Address::new(TARGET);
        backend.set(&target, "owner", Vec::new(), json!(ME)).await;
        let executor = executor(&backend, false);

        let request = StepRequest::new(
            StepTarget::new("Rates", target),
            WriteCall::new("poke", Vec::new()),
        );
        assert!(executor.ensure(request).await.unwrap().is_submitted());
        assert_eq!(backend.invoked_functions().await, vec!["poke"]);
    }

    #[tokio::test]
    async fn test_owner_override_skips_owner_read() {
        let backend = InMemoryBackend::new();
        let target = Address::new(TARGET);
        backend.set(&target, "rate", Vec::new(), json!(1)).await;
        let executor = executor(&backend, false);

        let outcome = executor
            .ensure(set_rate(5).owned_by(Address::new(ME)))
            .await
            .unwrap();
        assert!(outcome.is_submitted());
    }

    #[tokio::test]
    async fn test_non_address_owner_is_invalid_response() {
        let backend = InMemoryBackend::new();
        let target = Address::new(TARGET);
        backend.set(&target, "rate", Vec::new(), json!(1)).await;
        backend.set(&target, "owner", Vec::new(), json!(42)).await;
        let executor = executor(&backend, false);

        let result = executor.ensure(set_rate(5)).await;
        assert!(matches!(result, Err(Error::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_stats_count_outcomes() {
        let backend = InMemoryBackend::new();
        let target = Address::new(TARGET);
        backend.set(&target, "rate", Vec::new(), json!(5)).await;
        backend.set(&target, "owner", Vec::new(), json!(ME)).await;
        let executor = executor(&backend, true);

        executor.ensure(set_rate(5)).await.unwrap();
        executor.ensure(set_rate(6)).await.unwrap();

        assert_eq!(
            executor.stats(),
            ExecutorStats {
                noops: 1,
                submitted: 1,
                queued: 0
            }
        );
    }
}
