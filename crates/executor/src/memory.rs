//! In-memory backend used by tests and local rehearsals.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{Address, ReadCall, Receipt, Submission, SubmissionKind, TxId};

/// Side effect applied to the chain state when a matching submission lands.
pub type Effect = Arc<dyn Fn(&Submission, &mut ChainState) + Send + Sync>;

/// Mutable view of the simulated ledger.
#[derive(Debug, Default)]
pub struct ChainState {
    reads: HashMap<(Address, String, String), Value>,
    defaults: HashMap<(Address, String), Value>,
    nonces: HashMap<Address, u64>,
}

impl ChainState {
    /// Fix the result of `function(args)` on `target`.
    pub fn set(&mut self, target: &Address, function: &str, args: &[Value], value: Value) {
        self.reads
            .insert((target.clone(), function.to_string(), args_key(args)), value);
    }

    /// Result of `function` on `target` for any argument list without an
    /// exact entry.
    pub fn set_default(&mut self, target: &Address, function: &str, value: Value) {
        self.defaults
            .insert((target.clone(), function.to_string()), value);
    }

    fn get(&self, call: &ReadCall) -> Option<Value> {
        self.reads
            .get(&(
                call.target.clone(),
                call.function.clone(),
                args_key(&call.args),
            ))
            .or_else(|| {
                self.defaults
                    .get(&(call.target.clone(), call.function.clone()))
            })
            .cloned()
    }
}

fn args_key(args: &[Value]) -> String {
    Value::Array(args.to_vec()).to_string()
}

#[derive(Default)]
struct Inner {
    state: ChainState,
    submissions: Vec<Submission>,
    effects: Vec<(String, Effect)>,
    next_address: u64,
    fail_submit: Option<String>,
}

/// Backend that keeps the whole ledger in memory.
///
/// Reads return whatever was configured with [`InMemoryBackend::set`] or
/// written by an effect. A read with no configured value is an error, so a
/// test that forgets to seed state fails loudly instead of probing `null`.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, target: &Address, function: &str, args: Vec<Value>, value: Value) {
        self.inner
            .lock()
            .await
            .state
            .set(target, function, &args, value);
    }

    pub async fn set_default(&self, target: &Address, function: &str, value: Value) {
        self.inner
            .lock()
            .await
            .state
            .set_default(target, function, value);
    }

    /// Run `effect` whenever a call to `function` is submitted.
    pub async fn on_submit<F>(&self, function: &str, effect: F)
    where
        F: Fn(&Submission, &mut ChainState) + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .await
            .effects
            .push((function.to_string(), Arc::new(effect)));
    }

    /// Make every following submission fail with `reason`.
    pub async fn fail_submissions(&self, reason: impl Into<String>) {
        self.inner.lock().await.fail_submit = Some(reason.into());
    }

    pub async fn submissions(&self) -> Vec<Submission> {
        self.inner.lock().await.submissions.clone()
    }

    pub async fn submission_count(&self) -> usize {
        self.inner.lock().await.submissions.len()
    }

    /// Names of invoked functions, in submission order.
    pub async fn invoked_functions(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .submissions
            .iter()
            .filter_map(|s| match &s.kind {
                SubmissionKind::Invoke { call, .. } => Some(call.function.clone()),
                SubmissionKind::Deploy { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn call(&self, call: &ReadCall) -> Result<Value> {
        self.inner.lock().await.state.get(call).ok_or_else(|| {
            Error::backend(
                format!("call {}", call.function),
                format!("no state for {} on {}", call.function, call.target),
            )
        })
    }

    async fn submit(&self, submission: &Submission) -> Result<Receipt> {
        let mut inner = self.inner.lock().await;
        if let Some(reason) = &inner.fail_submit {
            return Err(Error::backend("submit", reason.clone()));
        }

        let nonce = inner.state.nonces.entry(submission.from.clone()).or_insert(0);
        if let Some(requested) = submission.nonce {
            if requested != *nonce {
                return Err(Error::backend(
                    "submit",
                    format!("nonce {requested} does not match expected {nonce}"),
                ));
            }
        }
        *nonce = nonce
            .checked_add(1)
            .ok_or_else(|| Error::backend("submit", format!("nonce exhausted for {}", submission.from)))?;

        inner.submissions.push(submission.clone());
        let sequence = u64::try_from(inner.submissions.len())
            .map_err(|e| Error::backend("submit", e.to_string()))?;
        let id = TxId::Hash(format!("0x{sequence:064x}"));

        let contract_address = match &submission.kind {
            SubmissionKind::Deploy { .. } => {
                inner.next_address = inner.next_address.saturating_add(1);
                Some(Address::new(format!("0x{:040x}", inner.next_address)))
            }
            SubmissionKind::Invoke { call, .. } => {
                let matching: Vec<Effect> = inner
                    .effects
                    .iter()
                    .filter(|(function, _)| *function == call.function)
                    .map(|(_, effect)| Arc::clone(effect))
                    .collect();
                for effect in matching {
                    effect(submission, &mut inner.state);
                }
                None
            }
        };

        Ok(Receipt {
            id,
            contract_address,
        })
    }

    async fn current_nonce(&self, account: &Address) -> Result<u64> {
        Ok(self
            .inner
            .lock()
            .await
            .state
            .nonces
            .get(account)
            .copied()
            .unwrap_or(0))
    }
}
