//! JSON-RPC 2.0 backend for the ledger node.
//!
//! Three methods are used:
//! - `ledger_call`: `[{target, function, args}]` → value
//! - `ledger_submit`: `[submission]` → `{hash, contractAddress?}`
//! - `ledger_nonce`: `[account]` → integer or `0x`-prefixed hex

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ledgerline_core::config::RpcConfig;
use ledgerline_executor::{Address, Backend, Error, ReadCall, Receipt, Result, Submission, TxId};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const CALL: &str = "ledger_call";
const SUBMIT: &str = "ledger_submit";
const NONCE: &str = "ledger_nonce";

/// Talks to a ledger node over HTTP.
pub struct RpcBackend {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcBackend {
    /// # Errors
    ///
    /// Returns a backend error if the HTTP client cannot be built.
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::backend("connect", e.to_string()))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = request_body(id, method, params);
        debug!(method, id, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::backend(method, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::backend(method, format!("HTTP {status}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::invalid_response(method, e.to_string()))?;
        parse_response(method, payload)
    }
}

#[async_trait]
impl Backend for RpcBackend {
    async fn call(&self, call: &ReadCall) -> Result<Value> {
        let params = serde_json::to_value(call).map_err(|e| Error::encoding(e.to_string()))?;
        self.request(CALL, json!([params])).await
    }

    async fn submit(&self, submission: &Submission) -> Result<Receipt> {
        let params =
            serde_json::to_value(submission).map_err(|e| Error::encoding(e.to_string()))?;
        let result = self.request(SUBMIT, json!([params])).await?;
        parse_receipt(result)
    }

    async fn current_nonce(&self, account: &Address) -> Result<u64> {
        let result = self.request(NONCE, json!([account.as_str()])).await?;
        parse_nonce(&result)
    }
}

fn request_body(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Pull `result` out of a response envelope, or turn `error` into a
/// backend error.
fn parse_response(method: &str, mut payload: Value) -> Result<Value> {
    if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
        let error: RpcError = serde_json::from_value(error.clone())
            .map_err(|e| Error::invalid_response(method, format!("malformed error: {e}")))?;
        return Err(Error::backend(
            method,
            format!("{} (code {})", error.message, error.code),
        ));
    }
    payload
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| Error::invalid_response(method, "response has neither result nor error"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResult {
    hash: String,
    #[serde(default)]
    contract_address: Option<String>,
}

fn parse_receipt(result: Value) -> Result<Receipt> {
    let result: SubmitResult =
        serde_json::from_value(result).map_err(|e| Error::invalid_response(SUBMIT, e.to_string()))?;
    Ok(Receipt {
        id: TxId::Hash(result.hash),
        contract_address: result.contract_address.map(Address::new),
    })
}

fn parse_nonce(result: &Value) -> Result<u64> {
    match result {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| Error::invalid_response(NONCE, format!("not a nonce: {n}"))),
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse(),
            };
            parsed.map_err(|e| Error::invalid_response(NONCE, format!("{s}: {e}")))
        }
        other => Err(Error::invalid_response(NONCE, format!("not a nonce: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = request_body(7, CALL, json!([{"function": "owner"}]));
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 7);
        assert_eq!(body["method"], "ledger_call");
        assert_eq!(body["params"][0]["function"], "owner");
    }

    #[test]
    fn test_parse_response_returns_result() {
        let value = parse_response(CALL, json!({"jsonrpc": "2.0", "id": 1, "result": true})).unwrap();
        assert_eq!(value, json!(true));
    }

    #[test]
    fn test_parse_response_null_result_is_kept() {
        let value = parse_response(CALL, json!({"jsonrpc": "2.0", "id": 1, "result": null})).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_parse_response_error_is_backend_error() {
        let err = parse_response(
            SUBMIT,
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "nonce too low"}}),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("nonce too low"), "{message}");
        assert!(message.contains("-32000"), "{message}");
    }

    #[test]
    fn test_parse_response_without_result_is_invalid() {
        assert!(parse_response(CALL, json!({"jsonrpc": "2.0", "id": 1})).is_err());
    }

    #[test]
    fn test_parse_receipt_with_contract_address() {
        let receipt = parse_receipt(json!({
            "hash": "0xabc",
            "contractAddress": "0x00000000000000000000000000000000000000AA"
        }))
        .unwrap();
        assert_eq!(receipt.id, TxId::Hash("0xabc".to_string()));
        assert_eq!(
            receipt.contract_address,
            Some(Address::new("0x00000000000000000000000000000000000000aa"))
        );
    }

    #[test]
    fn test_parse_nonce_forms() {
        assert_eq!(parse_nonce(&json!(12)).unwrap(), 12);
        assert_eq!(parse_nonce(&json!("0x1f")).unwrap(), 31);
        assert_eq!(parse_nonce(&json!("9")).unwrap(), 9);
        assert!(parse_nonce(&json!(-1)).is_err());
        assert!(parse_nonce(&json!(null)).is_err());
    }
}
