use crate::blockchain::models::{BlockHeader, LogEntry, TransactionReceipt};
use crate::config::Config;
use alloy_primitives::{Address, B256, U64};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_RETRIES: usize = 3;
const RETRY_MIN_DELAY: Duration = Duration::from_millis(250);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed RPC response for {method}: {reason}")]
    Decode { method: &'static str, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ClientError {
    /// Worth retrying within the same call.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Http(_) | ClientError::Rpc { .. })
    }
}

/// Read-only view of the chain used by the scanner.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn latest_block(&self) -> Result<u64, ClientError>;

    /// All logs in `[from_block, to_block]` emitted by any of `addresses` whose first topic
    /// is any of `topics`, in one round trip.
    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        addresses: &[Address],
        topics: &[B256],
    ) -> Result<Vec<LogEntry>, ClientError>;

    async fn transaction_succeeded(&self, tx_hash: B256) -> Result<bool, ClientError>;

    async fn block_timestamp(&self, block_number: u64) -> Result<DateTime<Utc>, ClientError>;
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// JSON-RPC client for an EVM node, paced by a rate limiter and retrying transient
/// failures with exponential backoff.
pub struct EvmClient {
    http: reqwest::Client,
    rpc_url: String,
    limiter: DefaultDirectRateLimiter,
    next_id: AtomicU64,
}

impl EvmClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(config.rpc_timeout).build()?;
        let per_second = NonZeroU32::new(config.rpc_rate_limit).unwrap_or(NonZeroU32::MIN);

        info!(
            "Initializing EVM client with RPC endpoint: {}, rate limit: {}/s",
            config.rpc_url, per_second
        );

        Ok(Self {
            http,
            rpc_url: config.rpc_url.clone(),
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            next_id: AtomicU64::new(1),
        })
    }

    fn backoff() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(RETRY_MIN_DELAY)
            .with_max_delay(RETRY_MAX_DELAY)
            .with_max_times(MAX_RETRIES)
            .with_jitter()
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> Result<T, ClientError> {
        self.limiter.until_ready().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: RpcResponse = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(response.result.unwrap_or(Value::Null)).map_err(|e| ClientError::Decode {
            method,
            reason: e.to_string(),
        })
    }

    async fn request<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> Result<T, ClientError> {
        (|| {
            let params = params.clone();
            async move { self.call(method, params).await }
        })
        .retry(Self::backoff())
        .when(ClientError::is_transient)
        .notify(|err, delay| warn!("RPC {} failed, retrying in {:?}: {}", method, delay, err))
        .await
    }
}

#[async_trait]
impl ChainReader for EvmClient {
    async fn latest_block(&self) -> Result<u64, ClientError> {
        let number: U64 = self.request("eth_blockNumber", json!([])).await?;
        Ok(number.to::<u64>())
    }

    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        addresses: &[Address],
        topics: &[B256],
    ) -> Result<Vec<LogEntry>, ClientError> {
        let params = json!([{
            "fromBlock": format!("{:#x}", from_block),
            "toBlock": format!("{:#x}", to_block),
            "address": addresses,
            "topics": [topics],
        }]);

        let logs: Vec<LogEntry> = self.request("eth_getLogs", params).await?;
        debug!(from_block, to_block, count = logs.len(), "Fetched logs");
        Ok(logs)
    }

    async fn transaction_succeeded(&self, tx_hash: B256) -> Result<bool, ClientError> {
        let receipt: Option<TransactionReceipt> = self
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;

        match receipt {
            Some(receipt) => Ok(receipt.succeeded()),
            None => Err(ClientError::NotFound(format!("receipt for {tx_hash}"))),
        }
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<DateTime<Utc>, ClientError> {
        let block: Option<BlockHeader> = self
            .request(
                "eth_getBlockByNumber",
                json!([format!("{:#x}", block_number), false]),
            )
            .await?;

        let block = block.ok_or_else(|| ClientError::NotFound(format!("block {block_number}")))?;
        let seconds = i64::try_from(block.timestamp).map_err(|_| ClientError::Decode {
            method: "eth_getBlockByNumber",
            reason: format!("timestamp {} out of range", block.timestamp),
        })?;

        DateTime::from_timestamp(seconds, 0).ok_or_else(|| ClientError::Decode {
            method: "eth_getBlockByNumber",
            reason: format!("timestamp {seconds} out of range"),
        })
    }
}
