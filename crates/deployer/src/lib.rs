//! Deployment coordination for ledgerline.
//!
//! Given a [`ledgerline_planner::DeploymentPlan`], the
//! [`DeploymentCoordinator`] decides for every resource whether to deploy a
//! fresh instance or reuse the recorded one, deploys in plan order and keeps
//! the [`DeploymentRecord`] on disk in step with what exists on the backend.
//! [`StepRunner`] then applies the manifest's configuration steps.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod artifacts;
pub mod coordinator;
pub mod error;
pub mod record;
pub mod resolve;
pub mod steps;

pub use artifacts::{abi_has_function, Artifact, ArtifactRegistry, FsArtifactRegistry, InMemoryArtifacts};
pub use coordinator::{
    decide, synthetic_address, Decision, DeployReason, DeployReport, DeployedResource,
    DeploymentCoordinator,
};
pub use error::{DeployError, DeployResult};
pub use record::{DeploymentRecord, RecordStore, Source, Target};
pub use resolve::{Accounts, ArgResolver};
pub use steps::{StepResult, StepRunner, StepsReport};
