//! Ethereum ledger client
//!
//! Reads historical balances from an Ethereum node over JSON-RPC:
//! `eth_getBalance` for ether and an `eth_call` of ERC-20 `balanceOf`
//! for tokens, both pinned to a `blockTag`. Also exposes block timestamps
//! for the date-to-block resolver.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::amount::RawBalance;
use super::client::{Account, BlockReference, LedgerClient};
use super::config::RpcConfig;
use super::error::{LedgerError, SnapshotError};
use super::resolver::BlockSource;

/// `balanceOf(address)` selector
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// JSON-RPC "invalid params"
const RPC_INVALID_PARAMS: i64 = -32602;
const RPC_INVALID_REQUEST: i64 = -32600;
const RPC_METHOD_NOT_FOUND: i64 = -32601;
/// Geth revert code
const RPC_EXECUTION_REVERTED: i64 = 3;

/// Ledger client backed by an Ethereum JSON-RPC endpoint
#[derive(Debug, Clone)]
pub struct EthLedgerClient {
    /// Full endpoint URL, credential included
    endpoint: String,
    /// Shared by every concurrent query; `reqwest::Client` is internally pooled
    client: reqwest::Client,
}

/// JSON-RPC request structure
#[derive(Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Only the header fields the resolver needs
#[derive(Deserialize, Debug)]
struct EthBlockHeader {
    timestamp: String,
}

impl EthLedgerClient {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, SnapshotError> {
        info!("Initializing ETH ledger client at {}", redact(&endpoint));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                SnapshotError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { endpoint, client })
    }

    /// Build from config, reading the credential from the environment.
    pub fn from_config(config: &RpcConfig) -> Result<Self, SnapshotError> {
        let endpoint = config.endpoint_from_env()?;
        Self::new(endpoint, config.timeout())
    }

    /// Make a JSON-RPC call
    async fn rpc_call<T, R>(&self, method: &'static str, params: T) -> Result<R, LedgerError>
    where
        T: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Transient(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_http_status(status.as_u16()));
        }

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| LedgerError::Transient(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(classify_rpc_error(error.code, &error.message));
        }

        rpc_response
            .result
            .ok_or_else(|| LedgerError::Transient(format!("No result in {} response", method)))
    }
}

#[async_trait]
impl LedgerClient for EthLedgerClient {
    async fn get_native_balance(
        &self,
        account: &Account,
        block: BlockReference,
    ) -> Result<RawBalance, LedgerError> {
        let quantity: String = self
            .rpc_call("eth_getBalance", (account.as_str(), block.to_block_tag()))
            .await?;
        RawBalance::from_hex_quantity(&quantity)
    }

    async fn get_token_balance(
        &self,
        contract_id: &str,
        account: &Account,
        block: BlockReference,
    ) -> Result<RawBalance, LedgerError> {
        let data = encode_balance_of(account)?;
        let call = json!({ "to": contract_id, "data": data });
        let word: String = self
            .rpc_call("eth_call", (call, block.to_block_tag()))
            .await?;
        RawBalance::from_abi_word(&word)
    }
}

#[async_trait]
impl BlockSource for EthLedgerClient {
    async fn latest_block(&self) -> Result<BlockReference, LedgerError> {
        let result: String = self.rpc_call("eth_blockNumber", Vec::<String>::new()).await?;
        let height = parse_hex_u64(&result)?;
        debug!("Latest ETH block: {}", height);
        Ok(BlockReference(height))
    }

    async fn block_timestamp(&self, block: BlockReference) -> Result<i64, LedgerError> {
        let header: EthBlockHeader = self
            .rpc_call("eth_getBlockByNumber", (block.to_block_tag(), false))
            .await?;
        let timestamp = parse_hex_u64(&header.timestamp)?;
        i64::try_from(timestamp)
            .map_err(|_| LedgerError::Permanent(format!("timestamp out of range: {}", timestamp)))
    }
}

/// ABI-encode `balanceOf(account)` call data.
pub fn encode_balance_of(account: &Account) -> Result<String, LedgerError> {
    let digits = account.as_str().strip_prefix("0x").unwrap_or(account.as_str());
    let bytes = hex::decode(digits)
        .map_err(|e| LedgerError::Permanent(format!("invalid account {}: {}", account, e)))?;
    if bytes.len() != 20 {
        return Err(LedgerError::Permanent(format!(
            "invalid account {}: expected 20 bytes, got {}",
            account,
            bytes.len()
        )));
    }

    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(format!("0x{}{}", BALANCE_OF_SELECTOR, hex::encode(word)))
}

/// HTTP-level failures: throttling and server errors are worth retrying.
pub fn classify_http_status(status: u16) -> LedgerError {
    let message = format!("HTTP status {}", status);
    match status {
        408 | 425 | 429 => LedgerError::Transient(message),
        500..=599 => LedgerError::Transient(message),
        _ => LedgerError::Permanent(message),
    }
}

/// JSON-RPC error object to transient/permanent.
///
/// Anything not recognizably caused by the request itself stays transient.
pub fn classify_rpc_error(code: i64, message: &str) -> LedgerError {
    let text = format!("RPC error {}: {}", code, message);
    let lower = message.to_lowercase();

    let permanent = matches!(
        code,
        RPC_INVALID_PARAMS | RPC_INVALID_REQUEST | RPC_METHOD_NOT_FOUND | RPC_EXECUTION_REVERTED
    ) || lower.contains("invalid argument")
        || lower.contains("invalid address")
        || lower.contains("execution reverted");

    // Rate limits are sometimes reported with generic codes.
    let throttled = lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("exceeded")
        || lower.contains("capacity");

    if permanent && !throttled {
        LedgerError::Permanent(text)
    } else {
        LedgerError::Transient(text)
    }
}

fn parse_hex_u64(value: &str) -> Result<u64, LedgerError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| LedgerError::Permanent(format!("Invalid hex number {}: {}", value, e)))
}

/// Hide the path of the endpoint URL, where hosted providers put the API key.
fn redact(endpoint: &str) -> String {
    match endpoint.find("://") {
        Some(scheme_end) => {
            let rest = &endpoint[scheme_end + 3..];
            match rest.find('/') {
                Some(path_start) => format!("{}/***", &endpoint[..scheme_end + 3 + path_start]),
                None => endpoint.to_string(),
            }
        }
        None => "***".to_string(),
    }
}
