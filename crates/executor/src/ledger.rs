//! Persistent ledger of privileged actions waiting for an owner.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ledgerline_core::document::{read_json_or_default, write_json};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::ActionKey;

/// A write the executing account could not send itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Name of the resource the write targets.
    pub target: String,
    /// Human-readable call, e.g. `setFee(5)`.
    pub action: String,
    /// Set out-of-band once the owner has sent the write.
    #[serde(default)]
    pub complete: bool,
    /// Hex-encoded payload.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Keyed, upsert-only store of [`PendingAction`]s.
///
/// Every mutation is written through to the backing file before it returns.
/// A ledger without a path lives only in memory.
#[derive(Debug, Default)]
pub struct PendingActionLedger {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<ActionKey, PendingAction>>,
}

impl PendingActionLedger {
    /// Load the ledger at `path`, starting empty if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries: BTreeMap<ActionKey, PendingAction> = read_json_or_default(&path)?;
        debug!(path = %path.display(), entries = entries.len(), "Opened pending-action ledger");
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert or replace the action stored under `key`, then persist.
    ///
    /// A replaced entry is overwritten as given, so an action queued again
    /// after being marked complete shows up as incomplete.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be written.
    pub async fn upsert(&self, key: ActionKey, action: PendingAction) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.get(&key).is_some_and(|existing| existing.complete) {
            warn!(key = %key, action = %action.action, "Owner action marked complete has not taken effect, reopening");
        }
        info!(key = %key, resource = %action.target, action = %action.action, "Recorded pending owner action");
        entries.insert(key, action);
        self.persist(&entries)
    }

    pub async fn get(&self, key: &ActionKey) -> Option<PendingAction> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn entries(&self) -> Vec<(ActionKey, PendingAction)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(key, action)| (key.clone(), action.clone()))
            .collect()
    }

    pub async fn incomplete(&self) -> Vec<(ActionKey, PendingAction)> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, action)| !action.complete)
            .map(|(key, action)| (key.clone(), action.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn persist(&self, entries: &BTreeMap<ActionKey, PendingAction>) -> Result<()> {
        match &self.path {
            Some(path) => Ok(write_json(path, entries)?),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn action(call: &str) -> PendingAction {
        PendingAction {
            target: "FeePool".to_string(),
            action: call.to_string(),
            complete: false,
            data: "0x00".to_string(),
            link: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_same_key_keeps_one_entry() {
        let ledger = PendingActionLedger::in_memory();
        let key = ActionKey::new("k1");
        ledger.upsert(key.clone(), action("setFee(5)")).await.unwrap();
        ledger.upsert(key, action("setFee(5)")).await.unwrap();
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_reopens_completed_action() {
        let ledger = PendingActionLedger::in_memory();
        let key = ActionKey::new("k1");
        let mut done = action("setFee(5)");
        done.complete = true;
        ledger.upsert(key.clone(), done).await.unwrap();
        ledger.upsert(key.clone(), action("setFee(5)")).await.unwrap();

        assert!(!ledger.get(&key).await.unwrap().complete);
        assert_eq!(ledger.incomplete().await.len(), 1);
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owner-actions.json");

        let ledger = PendingActionLedger::open(&path).unwrap();
        ledger.upsert(ActionKey::new("k1"), action("setFee(5)")).await.unwrap();
        ledger.upsert(ActionKey::new("k2"), action("pause()")).await.unwrap();

        let reopened = PendingActionLedger::open(&path).unwrap();
        assert_eq!(reopened.len().await, 2);
        assert_eq!(
            reopened.get(&ActionKey::new("k2")).await.unwrap().action,
            "pause()"
        );
    }
}
