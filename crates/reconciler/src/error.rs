//! Error types for the reconciler crate.

use std::fmt;

use ledgerline_core::ErrorKind;
use ledgerline_deployer::DeployError;
use ledgerline_planner::PlanError;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug)]
pub enum Error {
    /// The backend disagrees with a write that was just accepted.
    Consistency { resource: String, reason: String },
    /// A resource the reconciler needs has no recorded address.
    MissingResource { name: String },
    /// A read returned a value of the wrong shape.
    InvalidObservation { function: String, reason: String },
    /// Planning failed.
    Plan(PlanError),
    /// Deployment or configuration steps failed.
    Deploy(DeployError),
    /// A step could not be executed.
    Executor(ledgerline_executor::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consistency { resource, reason } => {
                write!(f, "consistency violation on {resource}: {reason}")
            }
            Self::MissingResource { name } => {
                write!(f, "resource '{name}' has no recorded address")
            }
            Self::InvalidObservation { function, reason } => {
                write!(f, "unexpected result from {function}: {reason}")
            }
            Self::Plan(err) => write!(f, "{err}"),
            Self::Deploy(err) => write!(f, "{err}"),
            Self::Executor(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Plan(err) => Some(err),
            Self::Deploy(err) => Some(err),
            Self::Executor(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PlanError> for Error {
    fn from(err: PlanError) -> Self {
        Self::Plan(err)
    }
}

impl From<DeployError> for Error {
    fn from(err: DeployError) -> Self {
        Self::Deploy(err)
    }
}

impl From<ledgerline_executor::Error> for Error {
    fn from(err: ledgerline_executor::Error) -> Self {
        Self::Executor(err)
    }
}

impl Error {
    /// Create a consistency error.
    pub fn consistency(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Consistency {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing resource error.
    pub fn missing_resource(name: impl Into<String>) -> Self {
        Self::MissingResource { name: name.into() }
    }

    /// Create an invalid observation error.
    pub fn invalid_observation(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidObservation {
            function: function.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Consistency { .. } => ErrorKind::Consistency,
            Self::MissingResource { .. } => ErrorKind::Configuration,
            Self::InvalidObservation { .. } => ErrorKind::Backend,
            Self::Plan(err) => err.kind(),
            Self::Deploy(err) => err.kind(),
            Self::Executor(err) => err.kind(),
        }
    }
}
