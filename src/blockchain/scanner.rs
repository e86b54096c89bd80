use crate::blockchain::client::{ChainReader, ClientError};
use crate::blockchain::processor::{decode_log, event_topics, DecodeError, Resolved, VaultContracts};
use crate::cache::MonitoredAddressCache;
use crate::config::Config;
use crate::db::{AddressStore, CursorStore, OutboxStore, StoreError};
use crate::models::ChainEvent;
use alloy_primitives::B256;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("RPC error: {0}")]
    Client(#[from] ClientError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// What one tick achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub safe_block: u64,
    pub cursor: u64,
    pub chunks: usize,
    pub recorded: usize,
}

/// Polls finalized blocks and appends vault events of monitored wallets to the outbox.
pub struct ChainScanner {
    chain: Arc<dyn ChainReader>,
    addresses: Arc<dyn AddressStore>,
    cursor: Arc<dyn CursorStore>,
    outbox: Arc<dyn OutboxStore>,
    monitored: MonitoredAddressCache,
    contracts: VaultContracts,
    chain_id: i64,
    finality_offset: u64,
    chunk_size: u64,
}

impl ChainScanner {
    pub fn new(
        config: &Config,
        chain: Arc<dyn ChainReader>,
        addresses: Arc<dyn AddressStore>,
        cursor: Arc<dyn CursorStore>,
        outbox: Arc<dyn OutboxStore>,
    ) -> Self {
        Self {
            chain,
            addresses,
            cursor,
            outbox,
            monitored: MonitoredAddressCache::new(config.monitored_cache_ttl),
            contracts: VaultContracts::from_config(config),
            chain_id: config.chain_id,
            finality_offset: config.finality_offset,
            chunk_size: config.chunk_size.max(1),
        }
    }

    pub async fn run(&self, every: Duration, shutdown: CancellationToken) {
        info!(
            "Starting chain scanner (finality offset {}, chunk size {})",
            self.finality_offset, self.chunk_size
        );

        let mut ticker = interval(every);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick(&shutdown).await {
                        Ok(summary) if summary.chunks > 0 => {
                            info!(
                                cursor = summary.cursor,
                                safe_block = summary.safe_block,
                                chunks = summary.chunks,
                                recorded = summary.recorded,
                                "Scan tick completed"
                            );
                        }
                        Ok(_) => {}
                        Err(ScanError::Client(e)) => warn!("Chain RPC unavailable, retrying next tick: {}", e),
                        Err(e) => error!("Scan tick aborted: {}", e),
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Shutting down chain scanner");
                    break;
                }
            }
        }
    }

    /// Processes `(cursor, safe_block]` chunk by chunk, advancing the cursor after each
    /// chunk is stored. Stops early on shutdown or when another scanner moved the cursor.
    pub async fn tick(&self, shutdown: &CancellationToken) -> Result<ScanSummary, ScanError> {
        let latest = self.chain.latest_block().await?;
        let safe_block = latest.saturating_sub(self.finality_offset);
        let mut cursor = self.cursor.last_processed_block().await?;

        let mut summary = ScanSummary {
            safe_block,
            cursor,
            ..Default::default()
        };

        if safe_block <= cursor {
            debug!(latest, safe_block, cursor, "No new finalized blocks");
            return Ok(summary);
        }

        while cursor < safe_block {
            if shutdown.is_cancelled() {
                break;
            }

            let from_block = cursor + 1;
            let to_block = cursor.saturating_add(self.chunk_size).min(safe_block);

            let recorded = self.process_chunk(from_block, to_block).await?;

            if !self.cursor.advance_cursor(cursor, to_block).await? {
                warn!(from = cursor, to = to_block, "Cursor moved by another scanner, ending tick");
                break;
            }

            cursor = to_block;
            summary.cursor = cursor;
            summary.chunks += 1;
            summary.recorded += recorded;
        }

        Ok(summary)
    }

    async fn process_chunk(&self, from_block: u64, to_block: u64) -> Result<usize, ScanError> {
        let events = self.resolve_range(from_block, to_block).await?;

        for event in &events {
            self.outbox.upsert_event(event).await?;
            debug!(
                tx_hash = %event.tx_hash,
                log_index = event.log_index,
                wallet = %event.wallet_address,
                event_type = %event.event_type(),
                "Recorded outbox event"
            );
        }

        if !events.is_empty() {
            info!(from_block, to_block, recorded = events.len(), "Stored vault events");
        }

        Ok(events.len())
    }

    /// Resolves `[from_block, to_block]` into outbox-ready events without writing anything.
    pub async fn resolve_range(&self, from_block: u64, to_block: u64) -> Result<Vec<ChainEvent>, ScanError> {
        let mut logs = self
            .chain
            .get_logs(from_block, to_block, &self.contracts.addresses(), &event_topics())
            .await?;

        logs.retain(|log| !log.removed);
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        let mut candidates = Vec::new();
        for log in &logs {
            let decoded = match decode_log(log, &self.contracts)? {
                Resolved::Event(decoded) => decoded,
                Resolved::Skipped(reason) => {
                    debug!(tx_hash = %log.transaction_hash, log_index = log.log_index, ?reason, "Skipping log");
                    continue;
                }
            };

            if !self.is_monitored(&decoded.wallet_address).await? {
                debug!(wallet = %decoded.wallet_address, "Skipping log for unmonitored wallet");
                continue;
            }

            candidates.push((log, decoded));
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let tx_hashes: BTreeSet<B256> = candidates.iter().map(|(log, _)| log.transaction_hash).collect();
        let receipts: HashMap<B256, bool> = try_join_all(tx_hashes.into_iter().map(|tx_hash| async move {
            self.chain
                .transaction_succeeded(tx_hash)
                .await
                .map(|succeeded| (tx_hash, succeeded))
        }))
        .await?
        .into_iter()
        .collect();

        candidates.retain(|(log, _)| {
            let succeeded = receipts.get(&log.transaction_hash).copied().unwrap_or(false);
            if !succeeded {
                debug!(tx_hash = %log.transaction_hash, "Skipping log from failed transaction");
            }
            succeeded
        });

        let blocks: BTreeSet<u64> = candidates.iter().map(|(log, _)| log.block_number).collect();
        let timestamps: HashMap<u64, DateTime<Utc>> = try_join_all(blocks.into_iter().map(|block_number| async move {
            self.chain
                .block_timestamp(block_number)
                .await
                .map(|tx_date| (block_number, tx_date))
        }))
        .await?
        .into_iter()
        .collect();

        let mut events = Vec::with_capacity(candidates.len());
        for (log, decoded) in candidates {
            let tx_date = timestamps
                .get(&log.block_number)
                .copied()
                .ok_or_else(|| ClientError::NotFound(format!("block {}", log.block_number)))?;
            events.push(decoded.into_event(log, tx_date));
        }

        Ok(events)
    }

    async fn is_monitored(&self, wallet_address: &str) -> Result<bool, StoreError> {
        if self.monitored.is_known(wallet_address, self.chain_id).await {
            return Ok(true);
        }

        let monitored = self.addresses.is_monitored(wallet_address, self.chain_id).await?;
        if monitored {
            self.monitored.remember(wallet_address, self.chain_id).await;
        }

        Ok(monitored)
    }
}
