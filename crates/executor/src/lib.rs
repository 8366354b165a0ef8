//! Idempotent, ownership-aware steps against a transactional backend.
//!
//! Every state change goes through [`StepExecutor::ensure`]: a read probe
//! decides whether the change is still needed, an ownership check decides
//! whether this account may make it, and writes it may not make are
//! recorded in a [`PendingActionLedger`] for the owner.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod backend;
pub mod error;
pub mod executor;
pub mod keys;
pub mod ledger;
pub mod memory;
pub mod nonce;
pub mod strategy;
pub mod types;

pub use backend::Backend;
pub use error::{Error, Result};
pub use executor::{ExecutorConfig, ExecutorStats, StepExecutor};
pub use keys::{action_key, call_data, encode_call};
pub use ledger::{PendingAction, PendingActionLedger};
pub use memory::{ChainState, InMemoryBackend};
pub use nonce::{NonceSequencer, NonceState};
pub use strategy::{Confirmer, InteractiveConfirm, OwnerActionStrategy, QueueForLater, StdinConfirmer};
pub use types::{
    values_match, ActionKey, Address, ReadCall, ReadProbe, Receipt, StepOutcome, StepRequest,
    StepTarget, Submission, SubmissionKind, TxId, WriteCall,
};
