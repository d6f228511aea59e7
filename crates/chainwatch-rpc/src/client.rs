//! Ledger RPC boundary.
//!
//! [`LedgerRpc`] is the four-query contract the snapshot composer needs. Every
//! call takes the endpoint explicitly so the caller decides which pool member
//! serves it. [`HttpLedgerRpc`] speaks JSON-RPC 2.0 over HTTP.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::trace;

use crate::endpoint::Endpoint;
use crate::error::{Result, RpcError};

/// Confirmation depth requested for block height and slot queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    #[default]
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the ledger's recent performance samples.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    #[serde(default)]
    pub slot: u64,
    /// Transactions observed during the sample period, if the node reports it.
    #[serde(default)]
    pub num_transactions: Option<u64>,
    #[serde(default)]
    pub num_slots: u64,
    #[serde(default)]
    pub sample_period_secs: u64,
}

/// Query surface of a finality-aware ledger RPC service.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Block height at the given commitment.
    async fn block_height(&self, endpoint: &Endpoint, commitment: Commitment) -> Result<u64>;

    /// Slot number at the given commitment.
    async fn slot(&self, endpoint: &Endpoint, commitment: Commitment) -> Result<u64>;

    /// Total token supply in base units at the given commitment.
    async fn total_supply(&self, endpoint: &Endpoint, commitment: Commitment) -> Result<u64>;

    /// Up to `limit` most recent performance samples, newest first.
    async fn recent_performance_samples(
        &self,
        endpoint: &Endpoint,
        limit: usize,
    ) -> Result<Vec<PerformanceSample>>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SupplyResult {
    value: SupplyValue,
}

#[derive(Debug, Deserialize)]
struct SupplyValue {
    total: u64,
}

/// JSON-RPC 2.0 client over HTTP POST.
pub struct HttpLedgerRpc {
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpLedgerRpc {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport {
                endpoint: String::new(),
                method: String::from("client-init"),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        method: &str,
        params: Value,
    ) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        trace!(endpoint = %endpoint, method, id, "sending rpc request");

        let response = self
            .client
            .post(endpoint.url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout {
                        endpoint: endpoint.url().to_string(),
                        method: method.to_string(),
                    }
                } else {
                    RpcError::Transport {
                        endpoint: endpoint.url().to_string(),
                        method: method.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RpcError::RateLimited {
                endpoint: endpoint.url().to_string(),
            });
        }
        if !status.is_success() {
            return Err(RpcError::HttpStatus {
                endpoint: endpoint.url().to_string(),
                status: status.as_u16(),
            });
        }

        let envelope: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::invalid_response(method, e.to_string()))?;

        decode_envelope(method, envelope)
    }
}

fn decode_envelope<T: DeserializeOwned>(method: &str, envelope: JsonRpcResponse) -> Result<T> {
    if let Some(err) = envelope.error {
        return Err(RpcError::Remote {
            method: method.to_string(),
            code: err.code,
            message: err.message,
        });
    }

    let result = envelope
        .result
        .ok_or_else(|| RpcError::invalid_response(method, "missing result"))?;

    serde_json::from_value(result).map_err(|e| RpcError::invalid_response(method, e.to_string()))
}

/// `[{"commitment": ...}]`, the config object shared by the commitment-aware methods.
fn commitment_params(commitment: Commitment) -> Value {
    json!([{ "commitment": commitment.as_str() }])
}

#[async_trait]
impl LedgerRpc for HttpLedgerRpc {
    async fn block_height(&self, endpoint: &Endpoint, commitment: Commitment) -> Result<u64> {
        self.call(endpoint, "getBlockHeight", commitment_params(commitment))
            .await
    }

    async fn slot(&self, endpoint: &Endpoint, commitment: Commitment) -> Result<u64> {
        self.call(endpoint, "getSlot", commitment_params(commitment))
            .await
    }

    async fn total_supply(&self, endpoint: &Endpoint, commitment: Commitment) -> Result<u64> {
        let supply: SupplyResult = self
            .call(endpoint, "getSupply", commitment_params(commitment))
            .await?;
        Ok(supply.value.total)
    }

    async fn recent_performance_samples(
        &self,
        endpoint: &Endpoint,
        limit: usize,
    ) -> Result<Vec<PerformanceSample>> {
        self.call(endpoint, "getRecentPerformanceSamples", json!([limit]))
            .await
    }
}
