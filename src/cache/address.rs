//! Positive-result cache in front of the monitored-address lookup.
//!
//! The watch-list only ever grows, so a wallet seen as monitored stays monitored and
//! can be served from memory. Misses are never cached: a wallet registered a moment
//! ago must be picked up by the next chunk.

use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CAPACITY: u64 = 100_000;

#[derive(Clone)]
pub struct MonitoredAddressCache {
    cache: Cache<(String, i64), ()>,
}

impl MonitoredAddressCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, ttl)
    }

    pub fn with_capacity(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn is_known(&self, wallet_address: &str, chain_id: i64) -> bool {
        self.cache
            .get(&(wallet_address.to_string(), chain_id))
            .await
            .is_some()
    }

    pub async fn remember(&self, wallet_address: &str, chain_id: i64) {
        self.cache.insert((wallet_address.to_string(), chain_id), ()).await;
        debug!("Cached monitored address: {} (chain {})", wallet_address, chain_id);
    }
}
