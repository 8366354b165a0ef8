//! Planning error types

use ledgerline_core::ErrorKind;
use thiserror::Error;

/// Errors raised while loading manifests or ordering resources.
///
/// All of them are configuration errors: they are detected before any
/// backend I/O and are never retried.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Duplicate resource declared: {0}")]
    DuplicateResource(String),

    #[error("Resource {0} depends on itself")]
    SelfDependency(String),

    #[error("Resource {resource} depends on unknown resource {dependency}")]
    UnknownDependency { resource: String, dependency: String },

    #[error("Cycle detected involving resources: {0:?}")]
    CycleDetected(Vec<String>),

    #[error("Duplicate parameter in overrides: {0}")]
    DuplicateParam(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ledgerline_core::Error),
}

impl PlanError {
    pub fn unknown_dependency(resource: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::UnknownDependency {
            resource: resource.into(),
            dependency: dependency.into(),
        }
    }

    pub fn cycle_detected(names: Vec<String>) -> Self {
        Self::CycleDetected(names)
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Manifest(inner) => inner.kind(),
            _ => ErrorKind::Configuration,
        }
    }
}

/// Result type for planning operations
pub type PlanResult<T> = std::result::Result<T, PlanError>;
