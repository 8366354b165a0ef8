//! Client-side nonce assignment.

use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::Address;

/// Counter state behind the sequencer lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonceState {
    /// Not yet read from the backend.
    #[default]
    Unseeded,
    /// Next value to hand out.
    Next(u64),
}

/// Hands out strictly increasing sequence numbers for one account.
///
/// The counter is seeded from the backend on first use and then only ever
/// moves forward. A reserved number is never returned, even if the
/// submission that used it fails.
#[derive(Debug)]
pub struct NonceSequencer {
    account: Address,
    state: Mutex<NonceState>,
}

impl NonceSequencer {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            state: Mutex::new(NonceState::Unseeded),
        }
    }

    /// Start from a known value instead of asking the backend.
    pub fn starting_at(account: Address, next: u64) -> Self {
        Self {
            account,
            state: Mutex::new(NonceState::Next(next)),
        }
    }

    #[must_use]
    pub fn account(&self) -> &Address {
        &self.account
    }

    /// Reserve the next sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if seeding from the backend fails or the counter
    /// would overflow.
    pub async fn reserve(&self, backend: &dyn Backend) -> Result<u64> {
        let mut state = self.state.lock().await;
        let next = match *state {
            NonceState::Next(next) => next,
            NonceState::Unseeded => {
                let seeded = backend.current_nonce(&self.account).await?;
                debug!(account = %self.account, nonce = seeded, "Seeded nonce sequencer");
                seeded
            }
        };
        let following = next.checked_add(1).ok_or_else(|| Error::NonceExhausted {
            account: self.account.to_string(),
        })?;
        *state = NonceState::Next(following);
        Ok(next)
    }

    pub async fn state(&self) -> NonceState {
        *self.state.lock().await
    }
}
