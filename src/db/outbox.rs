use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;

use super::{from_db_int, to_db_int, StoreError};
use crate::models::{ChainEvent, EventPayload, EventType, OutboxEvent, OutboxStatus};

const OUTBOX_COLUMNS: &str = "o.tx_hash, o.log_index, o.event_type, o.status, o.block_number, o.tx_date,
    o.wallet_address, o.event_data, o.amount::TEXT AS amount, o.from_asset, o.to_asset, o.created_at";

#[derive(sqlx::FromRow)]
struct OutboxRow {
    tx_hash: String,
    log_index: i64,
    event_type: String,
    status: String,
    block_number: i64,
    tx_date: DateTime<Utc>,
    wallet_address: String,
    event_data: Value,
    amount: String,
    from_asset: String,
    to_asset: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<OutboxRow> for OutboxEvent {
    type Error = StoreError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let event_type: EventType = row.event_type.parse()?;
        let payload = EventPayload::from_value(event_type, row.event_data)?;

        Ok(OutboxEvent {
            event: ChainEvent {
                tx_hash: row.tx_hash,
                log_index: from_db_int(row.log_index)?,
                block_number: from_db_int(row.block_number)?,
                tx_date: row.tx_date,
                wallet_address: row.wallet_address,
                amount: row.amount,
                from_asset: row.from_asset,
                to_asset: row.to_asset,
                payload,
            },
            status: row.status.parse::<OutboxStatus>()?,
            created_at: row.created_at,
        })
    }
}

/// Re-scanning a range rewrites the descriptive columns of existing rows but leaves
/// their delivery state (`status`, `created_at`, `claimed_at`) alone.
pub async fn upsert_event(pool: &PgPool, event: &ChainEvent) -> Result<(), StoreError> {
    let event_data = event.payload.to_value()?;

    sqlx::query(
        r#"
        INSERT INTO event_outbox
            (tx_hash, log_index, event_type, status, block_number, tx_date,
             wallet_address, event_data, amount, from_asset, to_asset)
        VALUES ($1, $2, $3, 'unsent', $4, $5, $6, $7, $8::NUMERIC, $9, $10)
        ON CONFLICT (tx_hash, log_index) DO UPDATE SET
            event_type = EXCLUDED.event_type,
            block_number = EXCLUDED.block_number,
            tx_date = EXCLUDED.tx_date,
            wallet_address = EXCLUDED.wallet_address,
            event_data = EXCLUDED.event_data,
            amount = EXCLUDED.amount,
            from_asset = EXCLUDED.from_asset,
            to_asset = EXCLUDED.to_asset
        "#,
    )
    .bind(&event.tx_hash)
    .bind(to_db_int(event.log_index)?)
    .bind(event.event_type().as_str())
    .bind(to_db_int(event.block_number)?)
    .bind(event.tx_date)
    .bind(&event.wallet_address)
    .bind(event_data)
    .bind(&event.amount)
    .bind(&event.from_asset)
    .bind(&event.to_asset)
    .execute(pool)
    .await?;

    Ok(())
}

/// Serializes claimers so each one sees the `processing` rows of the others.
const CLAIM_LOCK_KEY: i64 = 0x6576_656e_745f_6f62;

/// Claims up to `limit` unsent rows in discovery order, skipping every wallet that still
/// has a row in `processing`. A wallet's events are therefore never in flight in two
/// batches at once, and a row stuck with a dead publisher holds back the rest of its
/// wallet until it is reclaimed.
pub async fn claim_unsent(pool: &PgPool, limit: i64) -> Result<Vec<OutboxEvent>, StoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(CLAIM_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    let query = format!(
        r#"
        WITH claimable AS (
            SELECT e.tx_hash, e.log_index
            FROM event_outbox e
            WHERE e.status = 'unsent'
              AND NOT EXISTS (
                  SELECT 1 FROM event_outbox p
                  WHERE p.wallet_address = e.wallet_address
                    AND p.status = 'processing'
              )
            ORDER BY e.created_at, e.block_number, e.log_index
            LIMIT $1
            FOR UPDATE OF e SKIP LOCKED
        )
        UPDATE event_outbox AS o
        SET status = 'processing', claimed_at = NOW()
        FROM claimable c
        WHERE o.tx_hash = c.tx_hash AND o.log_index = c.log_index
        RETURNING {OUTBOX_COLUMNS}
        "#
    );

    let rows: Vec<OutboxRow> = sqlx::query_as(&query)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

    tx.commit().await?;

    let mut events = rows
        .into_iter()
        .map(OutboxEvent::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    // RETURNING carries no ordering guarantee
    events.sort_by(|a, b| {
        (a.created_at, a.event.block_number, a.event.log_index)
            .cmp(&(b.created_at, b.event.block_number, b.event.log_index))
    });

    Ok(events)
}

async fn release(
    pool: &PgPool,
    tx_hash: &str,
    event_type: EventType,
    log_index: u64,
    status: OutboxStatus,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE event_outbox
         SET status = $4, claimed_at = NULL
         WHERE tx_hash = $1 AND event_type = $2 AND log_index = $3 AND status = 'processing'",
    )
    .bind(tx_hash)
    .bind(event_type.as_str())
    .bind(to_db_int(log_index)?)
    .bind(status.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn mark_sent(pool: &PgPool, tx_hash: &str, event_type: EventType, log_index: u64) -> Result<(), StoreError> {
    release(pool, tx_hash, event_type, log_index, OutboxStatus::Sent).await
}

pub async fn mark_failed(pool: &PgPool, tx_hash: &str, event_type: EventType, log_index: u64) -> Result<(), StoreError> {
    release(pool, tx_hash, event_type, log_index, OutboxStatus::Unsent).await
}

/// Rows left in `processing` by a publisher that died mid-batch.
pub async fn reclaim_stale(pool: &PgPool, older_than: Duration) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE event_outbox
         SET status = 'unsent', claimed_at = NULL
         WHERE status = 'processing'
           AND claimed_at < NOW() - make_interval(secs => $1)",
    )
    .bind(older_than.as_secs_f64())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delivery state of one row; `None` when the row does not exist.
pub async fn get_status(pool: &PgPool, tx_hash: &str, log_index: u64) -> Result<Option<OutboxStatus>, StoreError> {
    let status: Option<String> = sqlx::query_scalar(
        "SELECT status FROM event_outbox WHERE tx_hash = $1 AND log_index = $2",
    )
    .bind(tx_hash)
    .bind(to_db_int(log_index)?)
    .fetch_optional(pool)
    .await?;

    Ok(status.map(|s| s.parse::<OutboxStatus>()).transpose()?)
}
