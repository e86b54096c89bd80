// Configuration for the indexing pipeline:
// - chain RPC endpoint, finality offset, scan chunk size
// - Postgres connection string
// - Kafka brokers / topic / consumer group
// - loop intervals, timeouts and the HTTP listener

use alloy_primitives::Address;
use dotenv::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::assets;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub database_url: String,
    pub kafka_brokers: String,
    pub kafka_topic: String,
    pub kafka_group_id: String,
    pub chain_id: i64,
    pub finality_offset: u64,
    pub chunk_size: u64,
    pub start_block: u64,
    pub scan_interval: Duration,
    pub publish_interval: Duration,
    pub publish_batch_size: i64,
    pub outbox_reclaim_after: Duration,
    pub rpc_timeout: Duration,
    pub rpc_rate_limit: u32,
    pub db_timeout: Duration,
    pub bus_timeout: Duration,
    pub monitored_cache_ttl: Duration,
    pub teller_address: Address,
    pub atomic_queue_address: Address,
    pub vault_address: Address,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let rpc_url = required("RPC_URL")?;
        let database_url = required("DATABASE_URL")?;
        let kafka_brokers =
            env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
        let kafka_topic = env::var("KAFKA_TOPIC").unwrap_or_else(|_| "vault-transfers".to_string());
        let kafka_group_id =
            env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "transfer-materializer".to_string());
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let chunk_size: u64 = parsed("CHUNK_SIZE", 100)?;
        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "CHUNK_SIZE",
                value: "0".to_string(),
            });
        }

        let rpc_rate_limit: u32 = parsed("RPC_RATE_LIMIT", 10)?;
        if rpc_rate_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "RPC_RATE_LIMIT",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            rpc_url,
            database_url,
            kafka_brokers,
            kafka_topic,
            kafka_group_id,
            chain_id: parsed("CHAIN_ID", 1)?,
            finality_offset: parsed("FINALITY_OFFSET", 32)?,
            chunk_size,
            start_block: parsed("START_BLOCK", 0)?,
            scan_interval: Duration::from_secs(parsed("SCAN_INTERVAL_SECS", 12)?),
            publish_interval: Duration::from_secs(parsed("PUBLISH_INTERVAL_SECS", 3)?),
            publish_batch_size: parsed("PUBLISH_BATCH_SIZE", 100)?,
            outbox_reclaim_after: Duration::from_secs(parsed("OUTBOX_RECLAIM_AFTER_SECS", 300)?),
            rpc_timeout: Duration::from_secs(parsed("RPC_TIMEOUT_SECS", 30)?),
            rpc_rate_limit,
            db_timeout: Duration::from_secs(parsed("DB_TIMEOUT_SECS", 10)?),
            bus_timeout: Duration::from_secs(parsed("BUS_TIMEOUT_SECS", 10)?),
            monitored_cache_ttl: Duration::from_secs(parsed("MONITORED_CACHE_TTL_SECS", 60)?),
            teller_address: parsed("TELLER_ADDRESS", assets::TELLER_ADDRESS)?,
            atomic_queue_address: parsed("ATOMIC_QUEUE_ADDRESS", assets::ATOMIC_QUEUE_ADDRESS)?,
            vault_address: parsed("VAULT_ADDRESS", assets::LBTCV.address)?,
            server_host,
            server_port: parsed("SERVER_PORT", 8080)?,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

/// Reads `key` and parses it, falling back to `default` when unset.
fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}
