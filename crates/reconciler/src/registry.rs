//! Name-to-address registry synchronization.
//!
//! Two phases:
//!
//! 1. **Import**: every recorded resource must be resolvable by name through
//!    the registry. Missing or outdated names are imported in one call.
//! 2. **Rebuild**: every resource that caches registry lookups must hold a
//!    fresh cache. Batch-capable resources are rebuilt through the registry
//!    in chunks; legacy resources are pointed at the registry one by one.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use itertools::Itertools;
use ledgerline_core::ExecutionProfile;
use ledgerline_deployer::{abi_has_function, DeploymentRecord};
use ledgerline_executor::{
    ActionKey, Address, ReadProbe, StepExecutor, StepOutcome, StepRequest, StepTarget, TxId,
    WriteCall,
};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};

/// How a resource keeps its registry lookups fresh, derived from its
/// interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Declares its required names and can be rebuilt by the registry.
    SupportsBatchRebuild,
    /// Older interface: one call sets the registry and refreshes the cache.
    SupportsLegacySync,
    /// Oldest interface: only the registry pointer can be set.
    SupportsLegacyResolverOnly,
    /// Does not use the registry.
    None,
}

impl Capability {
    #[must_use]
    pub fn from_abi(abi: &Value) -> Self {
        let has = |name| abi_has_function(abi, name);
        if has("rebuildCache") && has("resolverAddressesRequired") && has("isResolverCached") {
            Self::SupportsBatchRebuild
        } else if has("setResolverAndSyncCache") {
            Self::SupportsLegacySync
        } else if has("setResolver") {
            Self::SupportsLegacyResolverOnly
        } else {
            Self::None
        }
    }

    fn legacy_setter(self) -> Option<&'static str> {
        match self {
            Self::SupportsLegacySync => Some("setResolverAndSyncCache"),
            Self::SupportsLegacyResolverOnly => Some("setResolver"),
            Self::SupportsBatchRebuild | Self::None => None,
        }
    }
}

/// Configuration for the registry reconciler.
#[derive(Debug, Clone)]
pub struct RegistryReconcilerConfig {
    /// Name of the registry resource in the deployment record.
    pub resource: String,
    /// Resources rebuilt per `rebuildCaches` call.
    pub chunk_size: usize,
}

impl Default for RegistryReconcilerConfig {
    fn default() -> Self {
        Self {
            resource: "AddressResolver".to_string(),
            chunk_size: 20,
        }
    }
}

impl From<&ledgerline_core::config::RegistryConfig> for RegistryReconcilerConfig {
    fn from(config: &ledgerline_core::config::RegistryConfig) -> Self {
        Self {
            resource: config.resource.clone(),
            chunk_size: config.chunk_size(),
        }
    }
}

impl RegistryReconcilerConfig {
    pub fn for_profile(resource: impl Into<String>, profile: ExecutionProfile) -> Self {
        let chunk_size = match profile {
            ExecutionProfile::Efficient => 20,
            ExecutionProfile::Expensive => 7,
        };
        Self {
            resource: resource.into(),
            chunk_size,
        }
    }
}

/// Whether the reconciler ran to the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryStatus {
    Synced,
    /// The import needs the owner; nothing after it was attempted.
    Halted { key: ActionKey },
}

/// A batch resource left alone because the registry cannot serve it yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedResource {
    pub name: String,
    pub missing: Vec<String>,
}

/// Result of [`RegistryReconciler::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryReport {
    pub status: RegistryStatus,
    pub imported: Vec<String>,
    /// Size of every `rebuildCaches` call, in order.
    pub rebuilt_chunks: Vec<usize>,
    pub skipped: Vec<SkippedResource>,
    pub legacy: Vec<(String, StepOutcome)>,
}

impl RegistryReport {
    fn new() -> Self {
        Self {
            status: RegistryStatus::Synced,
            imported: Vec::new(),
            rebuilt_chunks: Vec::new(),
            skipped: Vec::new(),
            legacy: Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_halted(&self) -> bool {
        matches!(self.status, RegistryStatus::Halted { .. })
    }

    /// Steps deferred to the owner.
    #[must_use]
    pub fn queued(&self) -> usize {
        let import = usize::from(self.is_halted());
        import + self.legacy.iter().filter(|(_, o)| o.is_queued()).count()
    }
}

struct Binding<'a> {
    name: &'a str,
    address: &'a Address,
}

/// Brings the registry and every cache that depends on it in line with the
/// deployment record.
pub struct RegistryReconciler {
    executor: Arc<StepExecutor>,
    config: RegistryReconcilerConfig,
}

impl RegistryReconciler {
    pub fn new(executor: Arc<StepExecutor>, config: RegistryReconcilerConfig) -> Self {
        Self { executor, config }
    }

    /// Run both phases against `record`.
    ///
    /// # Errors
    ///
    /// Returns an error when the registry is not recorded, a read fails, or
    /// the backend still disagrees after an accepted write.
    #[instrument(skip_all, fields(registry = %self.config.resource))]
    pub async fn reconcile(&self, record: &DeploymentRecord) -> Result<RegistryReport> {
        let registry = record
            .address_of(&self.config.resource)
            .cloned()
            .ok_or_else(|| Error::missing_resource(&self.config.resource))?;
        let bindings: Vec<Binding<'_>> = record
            .targets
            .values()
            .filter(|target| !target.address.is_empty())
            .map(|target| Binding {
                name: &target.name,
                address: &target.address,
            })
            .collect();

        let mut report = RegistryReport::new();

        report.imported = self.stale_bindings(&registry, &bindings).await?;
        if !report.imported.is_empty() {
            if let Some(key) = self.import(&registry, &bindings, &report.imported).await? {
                warn!(key = %key, "Registry import needs the owner, halting");
                report.status = RegistryStatus::Halted { key };
                return Ok(report);
            }
        }

        let mut batch = Vec::new();
        let mut legacy = Vec::new();
        for target in record.targets.values().filter(|t| !t.address.is_empty()) {
            let capability = record
                .abi_of(&target.name)
                .map_or(Capability::None, Capability::from_abi);
            debug!(resource = %target.name, capability = ?capability, "Resolved capability");
            match capability {
                Capability::SupportsBatchRebuild => batch.push(target),
                Capability::SupportsLegacySync | Capability::SupportsLegacyResolverOnly => {
                    legacy.push((target, capability));
                }
                Capability::None => {}
            }
        }

        let required = self
            .fan_out(batch.iter().map(|t| t.address.clone()), |address| async move {
                let value = self
                    .executor
                    .read(&address, "resolverAddressesRequired", Vec::new())
                    .await?;
                string_list("resolverAddressesRequired", &value)
            })
            .await?;
        let bound = self.bound_names(&registry, &bindings, &required).await?;

        let mut ready = Vec::new();
        for (target, names) in batch.into_iter().zip(required) {
            let missing: Vec<String> = names
                .into_iter()
                .filter(|name| !bound.contains(name))
                .collect();
            if missing.is_empty() {
                ready.push(target);
            } else {
                warn!(
                    resource = %target.name,
                    missing = %missing.iter().join(", "),
                    "Registry cannot serve every required name, skipping"
                );
                report.skipped.push(SkippedResource {
                    name: target.name.clone(),
                    missing,
                });
            }
        }

        let cached = self.cache_flags(ready.iter().map(|t| t.address.clone())).await?;
        let stale: Vec<_> = ready
            .into_iter()
            .zip(cached)
            .filter(|(_, fresh)| !fresh)
            .map(|(target, _)| target)
            .collect();
        info!(stale = stale.len(), "Checked resolver caches");

        for chunk in stale.chunks(self.config.chunk_size.max(1)) {
            let members = chunk
                .iter()
                .map(|t| (t.name.as_str(), &t.address))
                .collect_vec();
            self.rebuild(&registry, &members).await?;
            report.rebuilt_chunks.push(chunk.len());
        }

        if !legacy.is_empty() {
            let requests = legacy
                .iter()
                .filter_map(|(target, capability)| {
                    capability.legacy_setter().map(|setter| {
                        StepRequest::new(
                            StepTarget::new(target.name.clone(), target.address.clone()),
                            WriteCall::new(setter, vec![registry.to_value()]),
                        )
                        .with_probe(ReadProbe::equals("resolver", Vec::new(), registry.to_value()))
                    })
                })
                .collect();
            let outcomes = self.executor.ensure_all(requests).await?;
            report.legacy = legacy
                .iter()
                .map(|(target, _)| target.name.clone())
                .zip(outcomes)
                .collect();
        }

        info!(
            imported = report.imported.len(),
            chunks = report.rebuilt_chunks.len(),
            skipped = report.skipped.len(),
            legacy = report.legacy.len(),
            "Registry reconciled"
        );
        Ok(report)
    }

    /// Names whose registry entry differs from the record.
    async fn stale_bindings(&self, registry: &Address, bindings: &[Binding<'_>]) -> Result<Vec<String>> {
        let current = self
            .fan_out(bindings.iter().map(|b| b.name.to_string()), |name| async move {
                Ok(self
                    .executor
                    .read(registry, "getAddress", vec![Value::String(name)])
                    .await?)
            })
            .await?;

        Ok(bindings
            .iter()
            .zip(current)
            .filter(|(binding, value)| Address::from_value(value).as_ref() != Some(binding.address))
            .map(|(binding, _)| binding.name.to_string())
            .collect())
    }

    /// Required names the registry resolves to a set address. Each distinct
    /// name is looked up once. A dry run never imported anything, so recorded
    /// names count as bound without a lookup.
    async fn bound_names(
        &self,
        registry: &Address,
        bindings: &[Binding<'_>],
        required: &[Vec<String>],
    ) -> Result<BTreeSet<String>> {
        let dry_run = self.executor.is_dry_run();
        let recorded: BTreeSet<&str> = bindings.iter().map(|b| b.name).collect();
        let lookups: Vec<String> = required
            .iter()
            .flatten()
            .filter(|name| !(dry_run && recorded.contains(name.as_str())))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let values = self
            .fan_out(lookups.iter().cloned(), |name| async move {
                Ok(self
                    .executor
                    .read(registry, "getAddress", vec![Value::String(name)])
                    .await?)
            })
            .await?;

        let mut bound: BTreeSet<String> = lookups
            .into_iter()
            .zip(values)
            .filter(|(_, value)| Address::from_value(value).is_some_and(|a| !a.is_unset()))
            .map(|(name, _)| name)
            .collect();
        if dry_run {
            bound.extend(recorded.into_iter().map(str::to_string));
        }
        debug!(bound = bound.len(), "Resolved required names");
        Ok(bound)
    }

    /// Import `names`; returns the action key when the import was deferred.
    async fn import(
        &self,
        registry: &Address,
        bindings: &[Binding<'_>],
        names: &[String],
    ) -> Result<Option<ActionKey>> {
        let addresses: Vec<&Address> = names
            .iter()
            .filter_map(|name| bindings.iter().find(|b| b.name == name.as_str()).map(|b| b.address))
            .collect();
        let write = WriteCall::new(
            "importAddresses",
            vec![
                Value::Array(names.iter().cloned().map(Value::String).collect()),
                Value::Array(addresses.iter().map(|a| a.to_value()).collect()),
            ],
        );
        info!(names = %names.iter().join(", "), "Importing addresses into registry");
        let request = StepRequest::new(
            StepTarget::new(self.config.resource.clone(), registry.clone()),
            write,
        );

        match self.executor.ensure(request).await? {
            StepOutcome::Queued { key } => Ok(Some(key)),
            StepOutcome::Submitted { id: TxId::Hash(_) } => {
                let stale = self.stale_bindings(registry, &names_only(bindings, names)).await?;
                match stale.first() {
                    Some(name) => Err(Error::consistency(
                        name.clone(),
                        "registry entry still differs after import",
                    )),
                    None => Ok(None),
                }
            }
            StepOutcome::Submitted { .. } | StepOutcome::NoOp => Ok(None),
        }
    }

    async fn rebuild(&self, registry: &Address, members: &[(&str, &Address)]) -> Result<()> {
        let write = WriteCall::new(
            "rebuildCaches",
            vec![Value::Array(members.iter().map(|(_, a)| a.to_value()).collect())],
        );
        let request = StepRequest::new(
            StepTarget::new(self.config.resource.clone(), registry.clone()),
            write,
        )
        .public();

        let outcome = self.executor.ensure(request).await?;
        info!(size = members.len(), "Rebuilt resolver caches");
        if let StepOutcome::Submitted { id: TxId::Hash(_) } = outcome {
            let flags = self.cache_flags(members.iter().map(|(_, a)| (*a).clone())).await?;
            if let Some(((name, _), _)) = members.iter().zip(flags).find(|(_, fresh)| !fresh) {
                return Err(Error::consistency(
                    *name,
                    "resolver cache still stale after rebuild",
                ));
            }
        }
        Ok(())
    }

    async fn cache_flags(&self, addresses: impl Iterator<Item = Address>) -> Result<Vec<bool>> {
        self.fan_out(addresses, |address| async move {
            let value = self
                .executor
                .read(&address, "isResolverCached", Vec::new())
                .await?;
            value
                .as_bool()
                .ok_or_else(|| Error::invalid_observation("isResolverCached", format!("expected a bool, got {value}")))
        })
        .await
    }

    /// Run `read` over `items` with bounded concurrency, keeping order.
    async fn fan_out<I, T, F, Fut, R>(&self, items: I, read: F) -> Result<Vec<R>>
    where
        I: Iterator<Item = T>,
        F: Fn(T) -> Fut,
        Fut: std::future::Future<Output = Result<R>>,
    {
        stream::iter(items)
            .map(read)
            .buffered(self.executor.concurrency())
            .try_collect()
            .await
    }
}

fn names_only<'a>(bindings: &'a [Binding<'a>], names: &[String]) -> Vec<Binding<'a>> {
    bindings
        .iter()
        .filter(|b| names.iter().any(|n| n == b.name))
        .map(|b| Binding {
            name: b.name,
            address: b.address,
        })
        .collect()
}

fn string_list(function: &str, value: &Value) -> Result<Vec<String>> {
    value
        .as_array()
        .and_then(|items| items.iter().map(|v| v.as_str().map(str::to_string)).collect())
        .ok_or_else(|| Error::invalid_observation(function, format!("expected a list of names, got {value}")))
}
