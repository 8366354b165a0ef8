//! What to do with a write the executing account is not allowed to send.

use std::io::{BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::ledger::{PendingAction, PendingActionLedger};
use crate::types::ActionKey;

/// Policy for deferring a privileged write.
#[async_trait]
pub trait OwnerActionStrategy: Send + Sync {
    /// Record `action` under `key` so the owner can send it later.
    ///
    /// Returning `Ok` means the step is reported as queued.
    async fn defer(&self, key: &ActionKey, action: &PendingAction) -> Result<()>;
}

/// Append the action to the pending-action ledger.
pub struct QueueForLater {
    ledger: Arc<PendingActionLedger>,
}

impl QueueForLater {
    pub fn new(ledger: Arc<PendingActionLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl OwnerActionStrategy for QueueForLater {
    async fn defer(&self, key: &ActionKey, action: &PendingAction) -> Result<()> {
        self.ledger.upsert(key.clone(), action.clone()).await
    }
}

/// Source of operator answers.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Show `action` to the operator and wait for a yes or no.
    async fn confirm(&self, action: &PendingAction) -> Result<bool>;
}

/// Asks on the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirmer;

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, action: &PendingAction) -> Result<bool> {
        let prompt = format!(
            "\nOwner action required on {}:\n  {}\n{}Confirm once the owner has sent it [y/N]: ",
            action.target,
            action.action,
            action
                .link
                .as_deref()
                .map(|link| format!("  {link}\n"))
                .unwrap_or_default(),
        );
        tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            stdout.write_all(prompt.as_bytes())?;
            stdout.flush()?;
            let mut answer = String::new();
            std::io::stdin().lock().read_line(&mut answer)?;
            Ok::<_, std::io::Error>(answer)
        })
        .await
        .map_err(|e| Error::backend("confirm", e.to_string()))?
        .map(|answer| is_yes(&answer))
        .map_err(|e| Error::backend("confirm", e.to_string()))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Block on an operator for every privileged write.
///
/// A confirmed action is still recorded in the ledger; a refused one aborts
/// the run.
pub struct InteractiveConfirm {
    ledger: Arc<PendingActionLedger>,
    confirmer: Arc<dyn Confirmer>,
}

impl InteractiveConfirm {
    pub fn new(ledger: Arc<PendingActionLedger>, confirmer: Arc<dyn Confirmer>) -> Self {
        Self { ledger, confirmer }
    }

    pub fn on_terminal(ledger: Arc<PendingActionLedger>) -> Self {
        Self::new(ledger, Arc::new(StdinConfirmer))
    }
}

#[async_trait]
impl OwnerActionStrategy for InteractiveConfirm {
    async fn defer(&self, key: &ActionKey, action: &PendingAction) -> Result<()> {
        if self.confirmer.confirm(action).await? {
            info!(key = %key, action = %action.action, "Operator confirmed owner action");
            self.ledger.upsert(key.clone(), action.clone()).await
        } else {
            warn!(key = %key, action = %action.action, "Operator declined owner action");
            Err(Error::OperatorDeclined {
                action: action.action.clone(),
            })
        }
    }
}
