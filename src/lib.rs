#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # ledgerline
//!
//! Deploys interdependent on-chain resources and reconciles the registry and
//! aggregate snapshot that tie them together.
//!
//! This library backs the `ledgerline` binary and re-exports the workspace
//! crates for convenience.

pub use ledgerline_core;
pub use ledgerline_deployer;
pub use ledgerline_executor;
pub use ledgerline_planner;
pub use ledgerline_reconciler;

pub mod cli;
pub mod commands;
pub mod rpc;

pub use rpc::RpcBackend;
