//! Core error types for ledgerline operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a failure.
///
/// Every crate maps its own errors onto one of these so the binary can report
/// a run failure consistently. Authorization deferrals are deliberately absent:
/// a queued pending action is an outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad manifests or settings, detected before any backend I/O.
    Configuration,
    /// Submission rejected, timeout, or read failure against the backend.
    Backend,
    /// Observed backend state contradicts what was just written or recorded.
    Consistency,
    /// Local durable state could not be read or written.
    Storage,
    /// An operator refused to confirm a privileged action.
    Operator,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Configuration => "configuration",
            Self::Backend => "backend",
            Self::Consistency => "consistency",
            Self::Storage => "storage",
            Self::Operator => "operator",
        };
        f.write_str(label)
    }
}

/// Core error type for ledgerline operations.
#[derive(Debug, Error)]
pub enum Error {
    // I/O errors
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("failed to write file '{path}': {reason}")]
    FileWriteFailed { path: PathBuf, reason: String },

    #[error("failed to create directory '{path}': {reason}")]
    DirectoryCreationFailed { path: PathBuf, reason: String },

    // Parsing errors
    #[error("JSON parse error in '{path}': {reason}")]
    JsonParseFailed { path: PathBuf, reason: String },

    #[error("TOML parse error in '{path}': {reason}")]
    TomlParseFailed { path: PathBuf, reason: String },

    #[error("JSON encode error: {reason}")]
    JsonEncodeFailed { reason: String },

    // Configuration
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a file write error.
    pub fn file_write_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a directory creation error.
    pub fn directory_creation_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DirectoryCreationFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::JsonParseFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a TOML parse error.
    pub fn toml_parse_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::TomlParseFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::JsonParseFailed { .. }
            | Self::TomlParseFailed { .. }
            | Self::InvalidConfig { .. } => ErrorKind::Configuration,
            Self::FileReadFailed { .. }
            | Self::FileWriteFailed { .. }
            | Self::DirectoryCreationFailed { .. }
            | Self::JsonEncodeFailed { .. } => ErrorKind::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_errors_are_configuration() {
        let err = Error::json_parse_failed("config.json", "expected value");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_invalid_config_is_configuration() {
        let err = Error::invalid_config("chunk_size must be positive");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().starts_with("invalid configuration"));
    }

    #[test]
    fn test_write_errors_are_storage() {
        let err = Error::file_write_failed("record.json", "read-only file system");
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("read-only"));
    }
}
