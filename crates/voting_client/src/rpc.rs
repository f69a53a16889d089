//! Ethereum JSON-RPC adapter for the voting contract.
//!
//! Reads go through `eth_call` against the latest block. Writes use
//! `eth_sendTransaction`, leaving signing to the node or wallet behind the
//! endpoint, and confirmation polls `eth_getTransactionReceipt`.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{
    domain::{Address, CandidateIndex, CandidateRecord, ChainId, TxHash, Wei, Winner},
    error::{ChainError, ChainResult, ErrorCode},
    protocol::{ContractCall, ContractQuery},
};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use url::Url;

use crate::{abi, ContractReader, ContractWriter};

const JSONRPC_VERSION: &str = "2.0";
const USER_REJECTED_CODE: i64 = 4001;
const EXECUTION_REVERTED_CODE: i64 = 3;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub rpc_url: Url,
    pub contract: Address,
    /// Account used as `from` on writes. Reads work without one.
    pub sender: Option<Address>,
    pub receipt_poll_interval: Duration,
    pub confirmation_timeout: Duration,
}

impl RpcSettings {
    pub fn new(rpc_url: Url, contract: Address) -> Self {
        Self {
            rpc_url,
            contract,
            sender: None,
            receipt_poll_interval: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TransactionReceipt {
    #[serde(default)]
    status: Option<String>,
}

pub struct JsonRpcVotingContract {
    http: Client,
    settings: RpcSettings,
    next_id: AtomicU64,
}

impl JsonRpcVotingContract {
    pub fn new(settings: RpcSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .context("failed to build JSON-RPC http client")?;
        Ok(Self {
            http,
            settings,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn settings(&self) -> &RpcSettings {
        &self.settings
    }

    pub async fn chain_id(&self) -> ChainResult<ChainId> {
        let result = self.request("eth_chainId", json!([])).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ChainError::decode("eth_chainId result is not a string"))?;
        parse_quantity(raw).map(ChainId)
    }

    async fn request(&self, method: &str, params: Value) -> ChainResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, method, "rpc: request");
        let response = self
            .http
            .post(self.settings.rpc_url.clone())
            .json(&RpcRequest {
                jsonrpc: JSONRPC_VERSION,
                id,
                method,
                params,
            })
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| ChainError::transport(format!("{method}: {err}")))?;
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|err| ChainError::decode(format!("{method}: invalid response body: {err}")))?;

        if let Some(error) = body.error {
            return Err(map_rpc_error(error));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    async fn call(&self, query: ContractQuery) -> ChainResult<Vec<u8>> {
        let data = abi::encode_query(&query);
        let result = self
            .request(
                "eth_call",
                json!([
                    {
                        "to": self.settings.contract.to_string(),
                        "data": abi::to_hex(&data),
                    },
                    "latest"
                ]),
            )
            .await?;
        let raw = result.as_str().ok_or_else(|| {
            ChainError::decode(format!("{} result is not hex data", query.function_name()))
        })?;
        abi::from_hex(raw)
    }
}

#[async_trait]
impl ContractReader for JsonRpcVotingContract {
    async fn workflow_status(&self) -> ChainResult<u8> {
        let data = self.call(ContractQuery::WorkflowStatus).await?;
        abi::decode_workflow_status(&data)
    }

    async fn get_candidate(&self, index: CandidateIndex) -> ChainResult<CandidateRecord> {
        let data = self.call(ContractQuery::GetCandidate { index }).await?;
        abi::decode_candidate(&data)
    }

    async fn get_winner(&self) -> ChainResult<Winner> {
        let data = self.call(ContractQuery::GetWinner).await?;
        abi::decode_winner(&data)
    }
}

#[async_trait]
impl ContractWriter for JsonRpcVotingContract {
    async fn submit(&self, call: &ContractCall, value: Option<Wei>) -> ChainResult<TxHash> {
        let sender = self.settings.sender.ok_or_else(|| {
            ChainError::new(
                ErrorCode::Validation,
                "no sender account configured for transactions",
            )
        })?;
        let mut tx = json!({
            "from": sender.to_string(),
            "to": self.settings.contract.to_string(),
            "data": abi::to_hex(&abi::encode_contract_call(call)),
        });
        if let Some(value) = value {
            tx["value"] = Value::String(format!("0x{:x}", value.0));
        }

        let result = self.request("eth_sendTransaction", json!([tx])).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ChainError::decode("eth_sendTransaction result is not a hash"))?;
        raw.parse()
    }

    async fn await_confirmation(&self, hash: TxHash) -> ChainResult<()> {
        let deadline = Instant::now() + self.settings.confirmation_timeout;
        loop {
            let result = match self
                .request("eth_getTransactionReceipt", json!([hash.to_string()]))
                .await
            {
                Ok(result) => result,
                Err(err) if matches!(err.code, ErrorCode::Transport | ErrorCode::Decode) => {
                    warn!(%hash, error = %err, "rpc: receipt poll failed, retrying");
                    Value::Null
                }
                Err(err) => return Err(err),
            };
            if !result.is_null() {
                let receipt: TransactionReceipt = serde_json::from_value(result)
                    .map_err(|err| ChainError::decode(format!("invalid receipt: {err}")))?;
                return match receipt.status.as_deref() {
                    Some("0x0") => Err(ChainError::reverted("transaction reverted on-chain")),
                    _ => Ok(()),
                };
            }
            if Instant::now() >= deadline {
                return Err(ChainError::new(
                    ErrorCode::Timeout,
                    format!("timed out waiting for confirmation of {hash}"),
                ));
            }
            sleep(self.settings.receipt_poll_interval).await;
        }
    }
}

fn parse_quantity(raw: &str) -> ChainResult<u64> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16)
        .map_err(|err| ChainError::decode(format!("invalid quantity '{raw}': {err}")))
}

fn revert_data(data: &Option<Value>) -> Option<&str> {
    match data {
        Some(Value::String(raw)) => Some(raw),
        Some(Value::Object(map)) => map.get("data").and_then(Value::as_str),
        _ => None,
    }
}

fn map_rpc_error(error: RpcErrorObject) -> ChainError {
    let lower = error.message.to_ascii_lowercase();
    if error.code == USER_REJECTED_CODE
        || lower.contains("user denied")
        || lower.contains("user rejected")
    {
        return ChainError::new(ErrorCode::UserRejected, error.message);
    }
    if lower.contains("insufficient funds") {
        return ChainError::new(ErrorCode::InsufficientFunds, error.message);
    }
    if error.code == EXECUTION_REVERTED_CODE || lower.contains("revert") {
        let reason = revert_data(&error.data)
            .and_then(|raw| abi::from_hex(raw).ok())
            .and_then(|bytes| abi::decode_revert_reason(&bytes))
            .unwrap_or(error.message);
        return ChainError::reverted(reason);
    }
    ChainError::transport(format!("rpc error {}: {}", error.code, error.message))
}

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod tests;
