pub mod address;
pub mod connection;
pub mod cursor;
pub mod migration;
pub mod order;
pub mod outbox;

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ChainEvent, EventType, Order, OutboxEvent, ParseEnumError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Value out of range for storage: {0}")]
    OutOfRange(u64),
}

impl From<ParseEnumError> for StoreError {
    fn from(err: ParseEnumError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// BIGINT columns hold u64 block numbers and log indexes.
pub(crate) fn to_db_int(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange(value))
}

pub(crate) fn from_db_int(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative integer {value}")))
}

/// Watch-list of wallets whose vault events are indexed.
#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Idempotent; returns whether a new row was created.
    async fn register_address(&self, wallet_address: &str, chain_id: i64) -> Result<bool, StoreError>;

    async fn is_monitored(&self, wallet_address: &str, chain_id: i64) -> Result<bool, StoreError>;
}

/// Singleton scan cursor.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn last_processed_block(&self) -> Result<u64, StoreError>;

    /// Compare-and-set from `from` to `to`. Returns `false` when the stored cursor is no
    /// longer `from` (another scanner got there first) or `to` would not move it forward.
    async fn advance_cursor(&self, from: u64, to: u64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Insert-or-update keyed by `(tx_hash, log_index)`. Never touches `status`.
    async fn upsert_event(&self, event: &ChainEvent) -> Result<(), StoreError>;

    /// Atomically moves up to `limit` unsent rows to `processing` and returns them in
    /// discovery order. Concurrent callers receive disjoint rows, and wallets that still
    /// have a row in `processing` are skipped entirely.
    async fn claim_unsent(&self, limit: i64) -> Result<Vec<OutboxEvent>, StoreError>;

    async fn mark_sent(&self, tx_hash: &str, event_type: EventType, log_index: u64) -> Result<(), StoreError>;

    /// Reverts a `processing` row to `unsent` for a later retry.
    async fn mark_failed(&self, tx_hash: &str, event_type: EventType, log_index: u64) -> Result<(), StoreError>;

    /// Reverts rows stuck in `processing` longer than `older_than`. Returns how many.
    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, StoreError>;
}

/// Materialized order rows. Written only by the materializer.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert-or-update keyed by `(tx_hash, log_index)`; `order_id` is kept on update.
    async fn upsert_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Rewrites the row identified by `order_id`, natural key included.
    async fn update_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn find_by_key(&self, tx_hash: &str, log_index: u64) -> Result<Option<Order>, StoreError>;

    async fn find_by_completion(&self, tx_hash: &str, log_index: u64) -> Result<Option<Order>, StoreError>;

    /// Most recent (by `tx_date`) in-progress withdrawal of the wallet.
    async fn last_in_progress_withdrawal(&self, wallet_address: &str) -> Result<Option<Order>, StoreError>;

    async fn in_progress_withdrawal_with_amount(
        &self,
        wallet_address: &str,
        amount: &str,
    ) -> Result<Option<Order>, StoreError>;

    /// Matches the order's own transaction first, then a fulfillment transaction.
    async fn order_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Order>, StoreError>;
}

/// Postgres implementation of every store trait over one pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AddressStore for PgStore {
    async fn register_address(&self, wallet_address: &str, chain_id: i64) -> Result<bool, StoreError> {
        Ok(address::add_address(&self.pool, wallet_address, chain_id).await?)
    }

    async fn is_monitored(&self, wallet_address: &str, chain_id: i64) -> Result<bool, StoreError> {
        Ok(address::is_address_monitored(&self.pool, wallet_address, chain_id).await?)
    }
}

#[async_trait]
impl CursorStore for PgStore {
    async fn last_processed_block(&self) -> Result<u64, StoreError> {
        cursor::get_last_processed_block(&self.pool).await
    }

    async fn advance_cursor(&self, from: u64, to: u64) -> Result<bool, StoreError> {
        cursor::advance_last_processed_block(&self.pool, from, to).await
    }
}

#[async_trait]
impl OutboxStore for PgStore {
    async fn upsert_event(&self, event: &ChainEvent) -> Result<(), StoreError> {
        outbox::upsert_event(&self.pool, event).await
    }

    async fn claim_unsent(&self, limit: i64) -> Result<Vec<OutboxEvent>, StoreError> {
        outbox::claim_unsent(&self.pool, limit).await
    }

    async fn mark_sent(&self, tx_hash: &str, event_type: EventType, log_index: u64) -> Result<(), StoreError> {
        outbox::mark_sent(&self.pool, tx_hash, event_type, log_index).await
    }

    async fn mark_failed(&self, tx_hash: &str, event_type: EventType, log_index: u64) -> Result<(), StoreError> {
        outbox::mark_failed(&self.pool, tx_hash, event_type, log_index).await
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, StoreError> {
        Ok(outbox::reclaim_stale(&self.pool, older_than).await?)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn upsert_order(&self, order: &Order) -> Result<(), StoreError> {
        order::upsert_order(&self.pool, order).await
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        order::update_order(&self.pool, order).await
    }

    async fn find_by_key(&self, tx_hash: &str, log_index: u64) -> Result<Option<Order>, StoreError> {
        order::get_order_by_key(&self.pool, tx_hash, log_index).await
    }

    async fn find_by_completion(&self, tx_hash: &str, log_index: u64) -> Result<Option<Order>, StoreError> {
        order::get_order_by_completion(&self.pool, tx_hash, log_index).await
    }

    async fn last_in_progress_withdrawal(&self, wallet_address: &str) -> Result<Option<Order>, StoreError> {
        order::get_last_in_progress_withdrawal(&self.pool, wallet_address).await
    }

    async fn in_progress_withdrawal_with_amount(
        &self,
        wallet_address: &str,
        amount: &str,
    ) -> Result<Option<Order>, StoreError> {
        order::get_in_progress_withdrawal_by_amount(&self.pool, wallet_address, amount).await
    }

    async fn order_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Order>, StoreError> {
        order::get_order_by_tx_hash(&self.pool, tx_hash).await
    }
}
