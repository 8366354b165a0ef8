//! Resource manifests and dependency-ordered deployment planning.
//!
//! A deployment is described by a list of [`ResourceSpec`]s. The
//! [`DependencyPlanner`] turns that list into a [`DeploymentPlan`]: a total
//! order in which every resource follows all of its dependencies. Planning is
//! pure and runs before any backend I/O.
//!
//! # Example
//!
//! ```
//! use ledgerline_planner::{ArgSpec, DependencyPlanner, ResourceSpec};
//!
//! let specs = vec![
//!     ResourceSpec::new("Issuer", "Issuer").with_arg(ArgSpec::address_of("Resolver")),
//!     ResourceSpec::new("Resolver", "AddressResolver"),
//! ];
//! let plan = DependencyPlanner::new().plan(&specs)?;
//! assert_eq!(plan.names().collect::<Vec<_>>(), vec!["Resolver", "Issuer"]);
//! # Ok::<(), ledgerline_planner::PlanError>(())
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod manifest;
pub mod planner;
pub mod spec;

pub use error::{PlanError, PlanResult};
pub use manifest::{CallSpec, DeployFlag, Manifest, ManifestPaths, ProbeSpec, StepSpec};
pub use planner::{DependencyPlanner, DeploymentPlan};
pub use spec::{AccountRole, ArgSpec, ResourceSpec};
