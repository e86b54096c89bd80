use crate::bus::{BusError, BusProducer};
use crate::config::Config;
use crate::db::{OutboxStore, StoreError};
use crate::models::{OutboxEvent, TransferMessage};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub reclaimed: u64,
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Rows put back unpublished because an earlier row of the same wallet failed.
    pub deferred: usize,
}

/// Drains the outbox to the bus, one claimed batch per tick.
pub struct OutboxPublisher {
    outbox: Arc<dyn OutboxStore>,
    producer: Arc<dyn BusProducer>,
    batch_size: i64,
    reclaim_after: Duration,
}

impl OutboxPublisher {
    pub fn new(config: &Config, outbox: Arc<dyn OutboxStore>, producer: Arc<dyn BusProducer>) -> Self {
        Self {
            outbox,
            producer,
            batch_size: config.publish_batch_size.max(1),
            reclaim_after: config.outbox_reclaim_after,
        }
    }

    pub async fn run(&self, every: Duration, shutdown: CancellationToken) {
        info!("Starting outbox publisher (batch size {})", self.batch_size);

        let mut ticker = interval(every);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.publish_batch().await {
                        Ok(summary) if summary.claimed > 0 => {
                            info!(
                                claimed = summary.claimed,
                                sent = summary.sent,
                                failed = summary.failed,
                                deferred = summary.deferred,
                                "Published outbox batch"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("Outbox publish tick failed: {}", e),
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Shutting down outbox publisher");
                    break;
                }
            }
        }
    }

    /// Sweeps stale claims, then claims and publishes one batch.
    ///
    /// Each message waits for the broker acknowledgment before its row is marked. Once a
    /// wallet fails, its later rows in the batch go back to `unsent` untouched, so the
    /// retry republishes them behind the failed one. If marking a row fails, every row
    /// from that one onward is put back to `unsent` before the error is returned.
    pub async fn publish_batch(&self) -> Result<PublishSummary, PublishError> {
        let mut summary = PublishSummary {
            reclaimed: self.outbox.reclaim_stale(self.reclaim_after).await?,
            ..Default::default()
        };
        if summary.reclaimed > 0 {
            warn!("Reclaimed {} outbox rows stuck in processing", summary.reclaimed);
        }

        let rows = self.outbox.claim_unsent(self.batch_size).await?;
        summary.claimed = rows.len();

        let mut halted: HashSet<String> = HashSet::new();

        for (i, row) in rows.iter().enumerate() {
            if let Err(e) = self.handle_row(row, &mut halted, &mut summary).await {
                self.release_remaining(&rows[i..]).await;
                return Err(e);
            }
        }

        Ok(summary)
    }

    async fn handle_row(
        &self,
        row: &OutboxEvent,
        halted: &mut HashSet<String>,
        summary: &mut PublishSummary,
    ) -> Result<(), PublishError> {
        let event = &row.event;
        let event_type = event.event_type();

        if halted.contains(&event.wallet_address) {
            self.outbox
                .mark_failed(&event.tx_hash, event_type, event.log_index)
                .await?;
            summary.deferred += 1;
            return Ok(());
        }

        match self.publish_one(row).await {
            Ok(()) => {
                self.outbox
                    .mark_sent(&event.tx_hash, event_type, event.log_index)
                    .await?;
                summary.sent += 1;
                debug!(
                    tx_hash = %event.tx_hash,
                    log_index = event.log_index,
                    wallet = %event.wallet_address,
                    "Published outbox event"
                );
            }
            Err(e) => {
                warn!(
                    tx_hash = %event.tx_hash,
                    log_index = event.log_index,
                    wallet = %event.wallet_address,
                    "Failed to publish outbox event: {}", e
                );
                self.outbox
                    .mark_failed(&event.tx_hash, event_type, event.log_index)
                    .await?;
                halted.insert(event.wallet_address.clone());
                summary.failed += 1;
            }
        }
        Ok(())
    }

    /// Best effort; a row this misses is picked up by the stale-claim sweep.
    async fn release_remaining(&self, rows: &[OutboxEvent]) {
        for row in rows {
            let event = &row.event;
            if let Err(e) = self
                .outbox
                .mark_failed(&event.tx_hash, event.event_type(), event.log_index)
                .await
            {
                error!(
                    tx_hash = %event.tx_hash,
                    log_index = event.log_index,
                    "Failed to release claimed outbox row: {}", e
                );
            }
        }
    }

    async fn publish_one(&self, row: &OutboxEvent) -> Result<(), PublishError> {
        let message = TransferMessage::from_outbox(row, Utc::now())?;
        let payload = message.to_bytes()?;
        self.producer.send(message.partition_key(), &payload).await?;
        Ok(())
    }
}
