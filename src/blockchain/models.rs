// Raw JSON-RPC shapes returned by the node. Only the fields the scanner reads are kept.

use alloy_primitives::{Address, Bytes, B256, U64};
use serde::{Deserialize, Deserializer};

/// One entry of an `eth_getLogs` result.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    /// Emitting contract
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,

    #[serde(rename = "blockNumber", deserialize_with = "from_hex_u64")]
    pub block_number: u64,

    #[serde(rename = "transactionHash")]
    pub transaction_hash: B256,

    /// Position of the log within its block.
    #[serde(rename = "logIndex", deserialize_with = "from_hex_u64")]
    pub log_index: u64,

    /// Set by the node when the log was dropped by a reorg.
    #[serde(default)]
    pub removed: bool,
}

/// Subset of `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionReceipt {
    /// `0x1` success, `0x0` reverted. Absent on pre-Byzantium receipts.
    #[serde(default)]
    pub status: Option<U64>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.map(|status| status == U64::from(1)).unwrap_or(false)
    }
}

/// Subset of `eth_getBlockByNumber` (without transactions).
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeader {
    #[serde(deserialize_with = "from_hex_u64")]
    pub number: u64,
    #[serde(deserialize_with = "from_hex_u64")]
    pub timestamp: u64,
}

fn from_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let hex_str: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(hex_str.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}
