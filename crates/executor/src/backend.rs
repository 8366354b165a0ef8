//! Backend trait for the transactional ledger.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{Address, ReadCall, Receipt, Submission};

/// Access to the ledger the executor writes to.
///
/// Implementations must be safe to share across tasks: reads are issued
/// concurrently, submissions one at a time per account.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Evaluate a state-reading call.
    async fn call(&self, call: &ReadCall) -> Result<Value>;

    /// Hand a signed write to the ledger.
    async fn submit(&self, submission: &Submission) -> Result<Receipt>;

    /// Next sequence number the ledger expects from `account`.
    async fn current_nonce(&self, account: &Address) -> Result<u64>;
}
