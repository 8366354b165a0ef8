//! Core types for the step executor.

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An account or resource address.
///
/// Stored lowercase so that addresses coming back from the backend compare
/// equal to the ones written in manifests regardless of checksum casing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    const ZERO: &'static str = "0x0000000000000000000000000000000000000000";

    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn zero() -> Self {
        Self(Self::ZERO.to_string())
    }

    /// Interpret a backend value as an address.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(Self::new)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Empty or the all-zero address.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.0.is_empty() || self.0 == Self::ZERO
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxId {
    /// Hash assigned by the backend.
    Hash(String),
    /// Synthetic id handed out in dry-run mode.
    DryRun(u64),
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash(hash) => f.write_str(hash),
            Self::DryRun(n) => write!(f, "dry-run-{n}"),
        }
    }
}

/// A state-reading call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadCall {
    pub target: Address,
    pub function: String,
    pub args: Vec<Value>,
}

impl ReadCall {
    pub fn new(target: Address, function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            target,
            function: function.into(),
            args,
        }
    }
}

/// A state-changing call on an already deployed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteCall {
    pub function: String,
    pub args: Vec<Value>,
}

impl WriteCall {
    pub fn new(function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }

    /// Build a call from a loosely shaped argument value.
    ///
    /// `null` becomes no arguments, an array is taken as the argument list,
    /// and any other value becomes a single argument. The same logical call
    /// therefore always produces the same argument list.
    pub fn from_value(function: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            single => vec![single],
        };
        Self::new(function, args)
    }

    /// Human-readable form, e.g. `setRate(5, "0xab…")`.
    #[must_use]
    pub fn signature(&self) -> String {
        format!("{}({})", self.function, self.args.iter().join(", "))
    }
}

/// What a submission does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionKind {
    /// Create a new resource from compiled bytecode.
    Deploy {
        artifact: String,
        bytecode: String,
        args: Vec<Value>,
    },
    /// Call a function on a deployed resource.
    Invoke { target: Address, call: WriteCall },
}

/// A signed write handed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub from: Address,
    /// `None` lets the backend assign the sequence number.
    pub nonce: Option<u64>,
    pub gas_limit: u64,
    pub max_price_wei: u64,
    pub kind: SubmissionKind,
}

/// Backend acknowledgement of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: TxId,
    /// Set for deployments.
    pub contract_address: Option<Address>,
}

/// The resource a step acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTarget {
    pub name: String,
    pub address: Address,
}

impl StepTarget {
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A read whose result decides whether a step still needs to run.
#[derive(Clone)]
pub struct ReadProbe {
    pub function: String,
    pub args: Vec<Value>,
    pub label: String,
    predicate: Predicate,
}

impl ReadProbe {
    /// Satisfied when the read returns `expected`.
    ///
    /// String results compare case-insensitively so checksummed and
    /// lowercase addresses match.
    pub fn equals(function: impl Into<String>, args: Vec<Value>, expected: Value) -> Self {
        let label = format!("== {expected}");
        Self::satisfies(function, args, label, move |current| {
            values_match(current, &expected)
        })
    }

    /// Satisfied when `predicate` holds for the read result.
    pub fn satisfies<F>(
        function: impl Into<String>,
        args: Vec<Value>,
        label: impl Into<String>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            function: function.into(),
            args,
            label: label.into(),
            predicate: Arc::new(predicate),
        }
    }

    #[must_use]
    pub fn is_satisfied(&self, current: &Value) -> bool {
        (self.predicate)(current)
    }
}

impl fmt::Debug for ReadProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadProbe")
            .field("function", &self.function)
            .field("args", &self.args)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Compare two backend values, ignoring ASCII case for strings.
#[must_use]
pub fn values_match(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_match(x, y))
        }
        _ => left == right,
    }
}

/// One "ensure this invariant holds" unit of work.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub target: StepTarget,
    pub read_probe: Option<ReadProbe>,
    pub write: WriteCall,
    /// Anyone may send this write, so ownership is not checked.
    pub publicly_callable: bool,
    /// Privileged account to compare against instead of reading `owner()`.
    pub owner_override: Option<Address>,
    pub gas_limit: Option<u64>,
}

impl StepRequest {
    pub fn new(target: StepTarget, write: WriteCall) -> Self {
        Self {
            target,
            read_probe: None,
            write,
            publicly_callable: false,
            owner_override: None,
            gas_limit: None,
        }
    }

    #[must_use]
    pub fn with_probe(mut self, probe: ReadProbe) -> Self {
        self.read_probe = Some(probe);
        self
    }

    #[must_use]
    pub fn public(mut self) -> Self {
        self.publicly_callable = true;
        self
    }

    #[must_use]
    pub fn owned_by(mut self, owner: Address) -> Self {
        self.owner_override = Some(owner);
        self
    }

    #[must_use]
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// Stable identity of a pending action.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionKey(String);

impl ActionKey {
    pub(crate) fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of [`crate::StepExecutor::ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The invariant already held; nothing was sent.
    NoOp,
    /// The write was handed to the backend.
    Submitted { id: TxId },
    /// The caller lacked privilege; the write was deferred.
    Queued { key: ActionKey },
}

impl StepOutcome {
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }

    #[must_use]
    pub const fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }

    #[must_use]
    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}
