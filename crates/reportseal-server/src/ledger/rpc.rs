//! Minimal Ethereum JSON-RPC client over reqwest.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reportseal_crypto::Address;
use serde_json::{json, Value};

/// JSON-RPC failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    /// Error object returned by the node. `data` carries revert payloads as hex when present.
    #[error("node error {code}: {message}")]
    Node {
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RpcError {
    /// Revert payload bytes attached to a node error, if any.
    pub fn revert_data(&self) -> Option<Vec<u8>> {
        match self {
            RpcError::Node { data: Some(data), .. } => decode_hex_bytes(data).ok(),
            _ => None,
        }
    }
}

/// Mined transaction receipt fields we use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    /// `false` when the transaction reverted.
    pub success: bool,
}

/// Log entry returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub transaction_hash: Option<String>,
    pub block_number: Option<u64>,
}

pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Sends one JSON-RPC request and returns its `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": id });
        tracing::trace!(method, id, "JSON-RPC request");

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("{} failed: {}", method, e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(format!("{} returned HTTP {} with non-JSON body: {}", method, status, e)))?;

        if let Some(error) = body.get("error") {
            return Err(node_error(error));
        }
        if !status.is_success() {
            return Err(RpcError::Transport(format!("{} returned HTTP {}", method, status)));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| RpcError::Malformed(format!("{} response has no result", method)))
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        quantity_u64(&self.call("eth_chainId", json!([])).await?)
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        quantity_u64(&self.call("eth_blockNumber", json!([])).await?)
    }

    pub async fn get_code(&self, address: &Address) -> Result<Vec<u8>, RpcError> {
        let result = self
            .call("eth_getCode", json!([address.to_string(), "latest"]))
            .await?;
        data_bytes(&result)
    }

    pub async fn get_balance(&self, address: &Address) -> Result<u128, RpcError> {
        quantity(&self.call("eth_getBalance", json!([address.to_string(), "latest"])).await?)
    }

    pub async fn gas_price(&self) -> Result<u128, RpcError> {
        quantity(&self.call("eth_gasPrice", json!([])).await?)
    }

    pub async fn pending_nonce(&self, address: &Address) -> Result<u64, RpcError> {
        quantity_u64(
            &self
                .call("eth_getTransactionCount", json!([address.to_string(), "pending"]))
                .await?,
        )
    }

    pub async fn eth_call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let call = json!({ "to": to.to_string(), "data": format!("0x{}", hex::encode(data)) });
        data_bytes(&self.call("eth_call", json!([call, "latest"])).await?)
    }

    pub async fn estimate_gas(&self, from: &Address, to: &Address, data: &[u8]) -> Result<u64, RpcError> {
        let call = json!({
            "from": from.to_string(),
            "to": to.to_string(),
            "data": format!("0x{}", hex::encode(data)),
        });
        quantity_u64(&self.call("eth_estimateGas", json!([call])).await?)
    }

    /// Broadcasts a signed transaction and returns its hash.
    /// Broadcasts a `0x`-prefixed signed transaction and returns its hash.
    pub async fn send_raw_transaction(&self, raw_hex: &str) -> Result<String, RpcError> {
        let result = self.call("eth_sendRawTransaction", json!([raw_hex])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::Malformed("eth_sendRawTransaction result is not a string".to_string()))
    }

    /// Receipt of a mined transaction, `None` while pending.
    pub async fn transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, RpcError> {
        let result = self.call("eth_getTransactionReceipt", json!([hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let field = |name: &str| {
            result
                .get(name)
                .ok_or_else(|| RpcError::Malformed(format!("receipt has no {}", name)))
        };
        Ok(Some(TransactionReceipt {
            transaction_hash: field("transactionHash")?
                .as_str()
                .unwrap_or(hash)
                .to_string(),
            block_number: quantity_u64(field("blockNumber")?)?,
            success: quantity(field("status")?)? == 1,
        }))
    }

    pub async fn get_logs(&self, filter: Value) -> Result<Vec<LogEntry>, RpcError> {
        let result = self.call("eth_getLogs", json!([filter])).await?;
        let entries = result
            .as_array()
            .ok_or_else(|| RpcError::Malformed("eth_getLogs result is not an array".to_string()))?;

        entries
            .iter()
            .map(|entry| {
                Ok::<_, RpcError>(LogEntry {
                    transaction_hash: entry
                        .get("transactionHash")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    block_number: match entry.get("blockNumber") {
                        Some(v) if !v.is_null() => Some(quantity_u64(v)?),
                        _ => None,
                    },
                })
            })
            .collect()
    }
}

fn node_error(error: &Value) -> RpcError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    // geth puts the revert payload in `data`; some providers nest it one level deeper
    let data = match error.get("data") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(obj)) => obj.get("data").and_then(Value::as_str).map(str::to_string),
        _ => None,
    };
    RpcError::Node { code, message, data }
}

/// Decodes `0x`-prefixed hex data.
pub fn decode_hex_bytes(input: &str) -> Result<Vec<u8>, RpcError> {
    let raw = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(raw).map_err(|e| RpcError::Malformed(format!("invalid hex data: {}", e)))
}

/// Parses a hex quantity such as `"0x1a"`.
pub fn parse_quantity(input: &str) -> Result<u128, RpcError> {
    let raw = input
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Malformed(format!("quantity without 0x prefix: {}", input)))?;
    if raw.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(raw, 16).map_err(|e| RpcError::Malformed(format!("invalid quantity {}: {}", input, e)))
}

fn quantity(value: &Value) -> Result<u128, RpcError> {
    let text = value
        .as_str()
        .ok_or_else(|| RpcError::Malformed(format!("expected hex quantity, got {}", value)))?;
    parse_quantity(text)
}

fn quantity_u64(value: &Value) -> Result<u64, RpcError> {
    let n = quantity(value)?;
    u64::try_from(n).map_err(|_| RpcError::Malformed(format!("quantity {} exceeds 64 bits", n)))
}

fn data_bytes(value: &Value) -> Result<Vec<u8>, RpcError> {
    let text = value
        .as_str()
        .ok_or_else(|| RpcError::Malformed(format!("expected hex data, got {}", value)))?;
    decode_hex_bytes(text)
}
