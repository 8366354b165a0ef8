//! Aggregate debt snapshot freshness.
//!
//! The snapshot resource caches a system-wide debt figure. It is refreshed
//! when any of these hold, in no particular order:
//!
//! - the cache is stale,
//! - the current rates are invalid,
//! - the validity flag changed since the snapshot was taken,
//! - the current debt deviates from the cached one by at least the
//!   threshold.

use std::sync::Arc;

use ledgerline_deployer::DeploymentRecord;
use ledgerline_executor::{Address, StepExecutor, StepOutcome, StepRequest, StepTarget, WriteCall};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};

/// Basis points in one whole.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Result of `cacheInfo()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    pub debt: u128,
    pub timestamp: u64,
    pub is_invalid: bool,
    pub is_stale: bool,
}

/// Result of `currentDebt()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentDebt {
    pub debt: u128,
    pub any_rate_is_invalid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub cached: CacheInfo,
    pub current: CurrentDebt,
}

/// One reason to refresh the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Stale,
    Invalid,
    ValidityChanged,
    /// Deviation in basis points, saturated at `u128::MAX`.
    Deviation { bps: u128 },
}

/// Every trigger that fired for an observation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDecision {
    pub triggers: Vec<Trigger>,
}

impl SnapshotDecision {
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        !self.triggers.is_empty()
    }
}

/// Relative deviation of `current` from `cached`, in basis points.
///
/// A zero cached debt against a non-zero current debt is an unbounded
/// deviation.
#[must_use]
pub fn deviation_bps(cached: u128, current: u128) -> u128 {
    let delta = cached.abs_diff(current);
    if delta == 0 {
        return 0;
    }
    if cached == 0 {
        return u128::MAX;
    }
    delta
        .checked_mul(BPS_DENOMINATOR)
        .map_or(u128::MAX, |scaled| scaled / cached)
}

/// Decide whether the snapshot must be refreshed.
#[must_use]
pub fn evaluate(observation: &Observation, threshold_bps: u32) -> SnapshotDecision {
    let Observation { cached, current } = observation;
    let mut triggers = Vec::new();

    if cached.is_stale {
        triggers.push(Trigger::Stale);
    }
    if current.any_rate_is_invalid {
        triggers.push(Trigger::Invalid);
    }
    if cached.is_invalid != current.any_rate_is_invalid {
        triggers.push(Trigger::ValidityChanged);
    }
    let bps = deviation_bps(cached.debt, current.debt);
    if bps > 0 && bps >= u128::from(threshold_bps) {
        triggers.push(Trigger::Deviation { bps });
    }

    SnapshotDecision { triggers }
}

/// Result of [`SnapshotReconciler::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReport {
    pub observation: Observation,
    pub decision: SnapshotDecision,
    pub outcome: StepOutcome,
}

/// Configuration for the snapshot reconciler.
#[derive(Debug, Clone)]
pub struct SnapshotReconcilerConfig {
    /// Name of the snapshot resource in the deployment record.
    pub resource: String,
    pub threshold_bps: u32,
    /// Whether anyone may take a snapshot, skipping the ownership check.
    pub publicly_callable: bool,
}

impl Default for SnapshotReconcilerConfig {
    fn default() -> Self {
        Self {
            resource: "DebtCache".to_string(),
            threshold_bps: 100,
            publicly_callable: false,
        }
    }
}

impl From<&ledgerline_core::config::SnapshotConfig> for SnapshotReconcilerConfig {
    fn from(config: &ledgerline_core::config::SnapshotConfig) -> Self {
        Self {
            resource: config.resource.clone(),
            threshold_bps: config.threshold_bps,
            publicly_callable: config.publicly_callable,
        }
    }
}

/// Keeps the aggregate debt snapshot fresh.
pub struct SnapshotReconciler {
    executor: Arc<StepExecutor>,
    config: SnapshotReconcilerConfig,
}

impl SnapshotReconciler {
    pub fn new(executor: Arc<StepExecutor>, config: SnapshotReconcilerConfig) -> Self {
        Self { executor, config }
    }

    /// Read the cached and current debt of the resource at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error when a read fails or returns an unexpected shape.
    pub async fn observe(&self, address: &Address) -> Result<Observation> {
        let (cache_info, current_debt) = futures::try_join!(
            self.executor.read(address, "cacheInfo", Vec::new()),
            self.executor.read(address, "currentDebt", Vec::new()),
        )?;
        Ok(Observation {
            cached: CacheInfo {
                debt: uint_field("cacheInfo", &cache_info, "debt")?,
                timestamp: u64::try_from(uint_field("cacheInfo", &cache_info, "timestamp")?)
                    .map_err(|e| Error::invalid_observation("cacheInfo", e.to_string()))?,
                is_invalid: bool_field("cacheInfo", &cache_info, "isInvalid")?,
                is_stale: bool_field("cacheInfo", &cache_info, "isStale")?,
            },
            current: CurrentDebt {
                debt: uint_field("currentDebt", &current_debt, "debt")?,
                any_rate_is_invalid: bool_field("currentDebt", &current_debt, "anyRateIsInvalid")?,
            },
        })
    }

    /// Refresh the snapshot if any trigger fires.
    ///
    /// # Errors
    ///
    /// Returns an error when the resource is not recorded, a read fails, or
    /// the refresh cannot be executed.
    #[instrument(skip_all, fields(resource = %self.config.resource))]
    pub async fn reconcile(&self, record: &DeploymentRecord) -> Result<SnapshotReport> {
        let address = record
            .address_of(&self.config.resource)
            .cloned()
            .ok_or_else(|| Error::missing_resource(&self.config.resource))?;

        let observation = self.observe(&address).await?;
        let decision = evaluate(&observation, self.config.threshold_bps);
        debug!(
            cached = %observation.cached.debt,
            current = %observation.current.debt,
            triggers = ?decision.triggers,
            "Evaluated debt snapshot"
        );

        let outcome = if decision.is_triggered() {
            let mut request = StepRequest::new(
                StepTarget::new(self.config.resource.clone(), address),
                WriteCall::new("takeDebtSnapshot", Vec::new()),
            );
            if self.config.publicly_callable {
                request = request.public();
            }
            let outcome = self.executor.ensure(request).await?;
            info!(triggers = ?decision.triggers, outcome = ?outcome, "Debt snapshot refreshed");
            outcome
        } else {
            info!("Debt snapshot is fresh");
            StepOutcome::NoOp
        };

        Ok(SnapshotReport {
            observation,
            decision,
            outcome,
        })
    }
}

fn field<'a>(function: &str, value: &'a Value, name: &str) -> Result<&'a Value> {
    value
        .get(name)
        .ok_or_else(|| Error::invalid_observation(function, format!("missing field {name}")))
}

/// Integers arrive as decimal strings or JSON numbers.
fn uint_field(function: &str, value: &Value, name: &str) -> Result<u128> {
    let raw = field(function, value, name)?;
    let parsed = match raw {
        Value::String(s) => s.trim().parse::<u128>().ok(),
        Value::Number(n) => n.as_u64().map(u128::from),
        _ => None,
    };
    parsed.ok_or_else(|| {
        Error::invalid_observation(function, format!("{name} is not an unsigned integer: {raw}"))
    })
}

fn bool_field(function: &str, value: &Value, name: &str) -> Result<bool> {
    let raw = field(function, value, name)?;
    raw.as_bool()
        .ok_or_else(|| Error::invalid_observation(function, format!("{name} is not a bool: {raw}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    fn observation(cached: u128, current: u128) -> Observation {
        Observation {
            cached: CacheInfo {
                debt: cached,
                timestamp: 1,
                is_invalid: false,
                is_stale: false,
            },
            current: CurrentDebt {
                debt: current,
                any_rate_is_invalid: false,
            },
        }
    }

    #[test]
    fn test_fresh_snapshot_does_not_trigger() {
        assert!(!evaluate(&observation(1_000, 1_000), 100).is_triggered());
        assert!(!evaluate(&observation(1_000, 1_009), 100).is_triggered());
        assert!(!evaluate(&observation(0, 0), 100).is_triggered());
    }

    #[test]
    fn test_each_trigger_alone() {
        let mut stale = observation(1_000, 1_000);
        stale.cached.is_stale = true;
        assert_eq!(evaluate(&stale, 100).triggers, vec![Trigger::Stale]);

        let mut changed = observation(1_000, 1_000);
        changed.cached.is_invalid = true;
        assert_eq!(evaluate(&changed, 100).triggers, vec![Trigger::ValidityChanged]);

        assert_eq!(
            evaluate(&observation(1_000, 1_010), 100).triggers,
            vec![Trigger::Deviation { bps: 100 }]
        );
        assert_eq!(
            evaluate(&observation(1_000, 990), 100).triggers,
            vec![Trigger::Deviation { bps: 100 }]
        );
    }

    #[test]
    fn test_invalid_rates_also_flip_validity() {
        let mut invalid = observation(1_000, 1_000);
        invalid.current.any_rate_is_invalid = true;
        assert_eq!(
            evaluate(&invalid, 100).triggers,
            vec![Trigger::Invalid, Trigger::ValidityChanged]
        );

        invalid.cached.is_invalid = true;
        assert_eq!(evaluate(&invalid, 100).triggers, vec![Trigger::Invalid]);
    }

    #[test]
    fn test_zero_cached_debt() {
        assert_eq!(deviation_bps(0, 1), u128::MAX);
        assert!(evaluate(&observation(0, 1), 10_000).is_triggered());
    }

    #[test]
    fn test_deviation_does_not_overflow() {
        assert_eq!(deviation_bps(1, u128::MAX), u128::MAX);
        assert_eq!(deviation_bps(u128::MAX, u128::MAX), 0);
    }

    #[test]
    fn test_uint_field_accepts_strings_and_numbers() {
        let value = json!({"debt": "340282366920938463463374607431768211455", "timestamp": 7});
        assert_eq!(uint_field("f", &value, "debt").unwrap(), u128::MAX);
        assert_eq!(uint_field("f", &value, "timestamp").unwrap(), 7);
        assert!(uint_field("f", &json!({"debt": -1}), "debt").is_err());
        assert!(uint_field("f", &json!({}), "debt").is_err());
    }
}
