//! Ethereum JSON-RPC client: `eth_call` reads plus the transaction calls the
//! rpc wallet needs.
//!
//! ## Resilience
//!
//! * Exponential back-off is applied when the RPC returns a soft error or a
//!   rate-limit response, doubling up to [`MAX_BACKOFF_MS`].
//! * Transient network errors (connection reset, timeout) are retried too.
//! * Retries are bounded: a read sits behind a user request, so after
//!   `max_retries` attempts the last error is returned.
//! * Writes (`eth_sendTransaction`) are sent exactly once. A failed send may
//!   still have reached the node, so it is reported, never re-posted.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::{ConciergeError, Result};

const MAX_BACKOFF_MS: u64 = 16_000;
const INITIAL_BACKOFF_MS: u64 = 500;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Errors that will not go away on retry: malformed requests, unknown
    /// methods and contract reverts.
    fn is_hard(&self) -> bool {
        self.code == -32600
            || self.code == -32601
            || self.code == -32602
            || self.code == 3
            || self.message.to_ascii_lowercase().contains("revert")
    }
}

/// Receipt fields the confirmation wait cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionReceipt {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    /// `0x1` on success, `0x0` on revert.
    pub status: Option<String>,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() == Some("0x1")
    }
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
    max_retries: u32,
    initial_backoff: Duration,
}

impl RpcClient {
    pub fn new(client: Client, url: impl Into<String>, max_retries: u32) -> Self {
        Self {
            client,
            url: url.into(),
            max_retries,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Override the first retry delay (tests use a few milliseconds).
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Issue a JSON-RPC request and return its `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0u32;

        loop {
            let err = match self.call_once(method, &params).await {
                Ok(value) => return Ok(value),
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Retryable(err)) => err,
            };

            attempt += 1;
            if attempt > self.max_retries {
                return Err(err);
            }
            warn!(
                "{method} failed (attempt {attempt}/{}, retrying in {}ms): {err}",
                self.max_retries,
                backoff.as_millis()
            );
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_millis(MAX_BACKOFF_MS));
        }
    }

    /// Issue a JSON-RPC request exactly once.
    pub async fn call_no_retry(&self, method: &str, params: Value) -> Result<Value> {
        self.call_once(method, &params).await.map_err(|attempt| match attempt {
            Attempt::Retryable(err) | Attempt::Fatal(err) => err,
        })
    }

    async fn call_once(&self, method: &str, params: &Value) -> std::result::Result<Value, Attempt> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| Attempt::Retryable(e.into()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(Attempt::Retryable(ConciergeError::Rpc(format!(
                "{method} returned HTTP {status}"
            ))));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| Attempt::Fatal(e.into()))?;

        if let Some(err) = body.error {
            let wrapped = ConciergeError::Rpc(format!("{} {}", err.code, err.message));
            return Err(if err.is_hard() {
                Attempt::Fatal(wrapped)
            } else {
                Attempt::Retryable(wrapped)
            });
        }

        debug!("{method} ok");
        Ok(body.result.unwrap_or(Value::Null))
    }

    /// `eth_call` against `latest`; returns the hex-encoded return data.
    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String> {
        let result = self
            .call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        result
            .as_str()
            .map(String::from)
            .ok_or_else(|| ConciergeError::Rpc("eth_call returned a non-string result".to_string()))
    }

    /// `eth_sendTransaction`; the node signs with the `from` account.
    pub async fn send_transaction(
        &self,
        from: &str,
        to: &str,
        data: &str,
        value_wei: u128,
    ) -> Result<String> {
        let result = self
            .call_no_retry(
                "eth_sendTransaction",
                json!([{
                    "from": from,
                    "to": to,
                    "data": data,
                    "value": format!("0x{value_wei:x}"),
                }]),
            )
            .await?;
        result.as_str().map(String::from).ok_or_else(|| {
            ConciergeError::Rpc("eth_sendTransaction returned a non-string result".to_string())
        })
    }

    /// `None` while the transaction is still pending.
    pub async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>> {
        let result = self
            .call("eth_getTransactionReceipt", json!([hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(result)?))
    }
}

enum Attempt {
    Retryable(ConciergeError),
    Fatal(ConciergeError),
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
