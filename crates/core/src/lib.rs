//! Core types, errors, and utilities for ledgerline.
//!
//! Everything here is shared by the planner, executor, deployer and
//! reconciler crates: the error taxonomy, the `Result` alias, durable JSON
//! documents and the layered configuration.

pub mod config;
pub mod document;
pub mod error;
pub mod result;

pub use config::{load_config, Config, ExecutionProfile};
pub use error::{Error, ErrorKind};
pub use result::{Result, ResultExt};
