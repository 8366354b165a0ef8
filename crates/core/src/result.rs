//! Result alias and the logging combinator shared across the workspace.

use crate::error::Error;

/// The standard Result type for ledgerline operations.
///
/// Use the `?` operator or `match`; library code never unwraps.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for results whose failure is worth a log line before it
/// propagates.
pub trait ResultExt<T> {
    /// Inspect the error without consuming the Result.
    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self;
}

impl<T> ResultExt<T> for Result<T> {
    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self {
        if let Err(ref e) = self {
            f(e);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_error_skips_ok() {
        let result: Result<i32> = Ok(42);
        let mut called = false;
        let result = result.inspect_error(|_| {
            called = true;
        });
        assert!(!called);
        assert_eq!(result.ok(), Some(42));
    }

    #[test]
    fn test_result_inspect_error() {
        let result: Result<i32> = Err(Error::invalid_config("concurrency must be positive"));
        let mut called = false;
        let _ = result.inspect_error(|_| {
            called = true;
        });
        assert!(called);
    }
}
