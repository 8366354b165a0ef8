//! Error types for the executor crate.

use std::fmt;

use ledgerline_core::ErrorKind;

/// Result type alias for executor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Executor error types.
#[derive(Debug, Clone)]
pub enum Error {
    /// A backend read, submission or nonce query failed.
    Backend { operation: String, reason: String },
    /// The backend answered with something the executor cannot interpret.
    InvalidResponse { operation: String, reason: String },
    /// An operator refused to confirm a privileged action.
    OperatorDeclined { action: String },
    /// The pending-action ledger could not be persisted.
    Storage { reason: String },
    /// A call could not be encoded for the ledger.
    Encoding { reason: String },
    /// The nonce counter cannot advance any further.
    NonceExhausted { account: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { operation, reason } => {
                write!(f, "backend {operation} failed: {reason}")
            }
            Self::InvalidResponse { operation, reason } => {
                write!(f, "unexpected backend response to {operation}: {reason}")
            }
            Self::OperatorDeclined { action } => {
                write!(f, "operator declined privileged action {action}")
            }
            Self::Storage { reason } => {
                write!(f, "pending-action ledger storage failed: {reason}")
            }
            Self::Encoding { reason } => {
                write!(f, "call encoding failed: {reason}")
            }
            Self::NonceExhausted { account } => {
                write!(f, "nonce space exhausted for account {account}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<ledgerline_core::Error> for Error {
    fn from(err: ledgerline_core::Error) -> Self {
        Self::Storage {
            reason: err.to_string(),
        }
    }
}

impl Error {
    /// Create a backend error.
    pub fn backend(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an encoding error.
    pub fn encoding(reason: impl Into<String>) -> Self {
        Self::Encoding {
            reason: reason.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Backend { .. } | Self::InvalidResponse { .. } | Self::NonceExhausted { .. } => {
                ErrorKind::Backend
            }
            Self::OperatorDeclined { .. } => ErrorKind::Operator,
            Self::Storage { .. } | Self::Encoding { .. } => ErrorKind::Storage,
        }
    }
}
