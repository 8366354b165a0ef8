//! Global fixpoints over a deployed resource graph.
//!
//! - [`RegistryReconciler`]: every resource resolvable by name through the
//!   registry, and every dependent cache rebuilt.
//! - [`SnapshotReconciler`]: the aggregate debt snapshot refreshed whenever
//!   it is stale, invalid or too far from the live figure.
//! - [`Pipeline`]: plan, deploy, configure, then both of the above.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod pipeline;
pub mod registry;
pub mod snapshot;

pub use error::{Error, Result};
pub use pipeline::{plan, Pipeline, PipelineConfig, RunReport};
pub use registry::{
    Capability, RegistryReconciler, RegistryReconcilerConfig, RegistryReport, RegistryStatus,
    SkippedResource,
};
pub use snapshot::{
    deviation_bps, evaluate, CacheInfo, CurrentDebt, Observation, SnapshotDecision,
    SnapshotReconciler, SnapshotReconcilerConfig, SnapshotReport, Trigger, BPS_DENOMINATOR,
};
