//! Deployment error types

use ledgerline_core::ErrorKind;
use ledgerline_planner::PlanError;
use thiserror::Error;

/// Errors raised while deploying resources or running configuration steps.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("missing address for resource marked reuse: {0}")]
    MissingReuseAddress(String),

    #[error("Resource {resource} uses artifact {artifact}, which is not in the build directory")]
    MissingArtifact { resource: String, artifact: String },

    #[error("Artifact {artifact} is malformed: {reason}")]
    InvalidArtifact { artifact: String, reason: String },

    #[error("Resource {resource} references unknown parameter {key}")]
    MissingParam { resource: String, key: String },

    #[error("Resource {resource} needs the address of {reference}, which has none")]
    UnresolvedAddress { resource: String, reference: String },

    #[error("Account {role} is not configured")]
    MissingAccount { role: String },

    #[error("Configuration step targets unknown resource {0}")]
    UnknownStepTarget(String),

    #[error("Backend returned no address for deployed resource {0}")]
    NoContractAddress(String),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Executor(#[from] ledgerline_executor::Error),

    #[error(transparent)]
    Storage(#[from] ledgerline_core::Error),
}

impl DeployError {
    pub fn missing_artifact(resource: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self::MissingArtifact {
            resource: resource.into(),
            artifact: artifact.into(),
        }
    }

    pub fn missing_param(resource: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingParam {
            resource: resource.into(),
            key: key.into(),
        }
    }

    pub fn unresolved_address(resource: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::UnresolvedAddress {
            resource: resource.into(),
            reference: reference.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Plan(inner) => inner.kind(),
            Self::Executor(inner) => inner.kind(),
            Self::Storage(inner) => inner.kind(),
            Self::NoContractAddress(_) => ErrorKind::Backend,
            Self::MissingReuseAddress(_)
            | Self::MissingArtifact { .. }
            | Self::InvalidArtifact { .. }
            | Self::MissingParam { .. }
            | Self::UnresolvedAddress { .. }
            | Self::MissingAccount { .. }
            | Self::UnknownStepTarget(_) => ErrorKind::Configuration,
        }
    }
}

/// Result type for deployment operations
pub type DeployResult<T> = std::result::Result<T, DeployError>;
