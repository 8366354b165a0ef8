//! Stable identities for deferred privileged actions.
//!
//! ```text
//! namespace = UUID v5(DNS_NAMESPACE, target address)
//! call_hash = SHA-256(json({ function, args }))
//! key       = UUID v5(namespace, call_hash)
//! ```
//!
//! The same call against the same resource always maps to the same key, so
//! re-running a deployment updates a ledger entry instead of adding one.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{ActionKey, Address, WriteCall};

#[derive(Serialize)]
struct CanonicalCall<'a> {
    function: &'a str,
    args: &'a [Value],
}

/// Canonical JSON bytes of a call.
///
/// # Errors
///
/// Returns an error if an argument cannot be serialized.
pub fn encode_call(call: &WriteCall) -> Result<Vec<u8>> {
    serde_json::to_vec(&CanonicalCall {
        function: &call.function,
        args: &call.args,
    })
    .map_err(|e| Error::encoding(e.to_string()))
}

/// Hex calldata recorded next to a pending action.
///
/// # Errors
///
/// Returns an error if the call cannot be encoded.
pub fn call_data(call: &WriteCall) -> Result<String> {
    encode_call(call).map(|bytes| format!("0x{}", hex::encode(bytes)))
}

#[inline]
fn hash_input(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn namespace_for(target: &Address) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, target.as_str().as_bytes())
}

/// Deterministic key for `call` on `target`.
///
/// # Errors
///
/// Returns an error if the call cannot be encoded.
pub fn action_key(target: &Address, call: &WriteCall) -> Result<ActionKey> {
    let encoded = encode_call(call)?;
    let key = Uuid::new_v5(&namespace_for(target), &hash_input(&encoded));
    Ok(ActionKey::new(key.to_string()))
}
