use sqlx::PgPool;
use tracing::info;

use super::to_db_int;
use super::StoreError;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS monitored_addresses (
        id BIGSERIAL PRIMARY KEY,
        wallet_address VARCHAR(42) NOT NULL,
        chain_id BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (wallet_address, chain_id)
    )",
    "CREATE TABLE IF NOT EXISTS crawler_state (
        id INTEGER PRIMARY KEY DEFAULT 1,
        last_processed_block BIGINT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT crawler_state_singleton CHECK (id = 1)
    )",
    // clock_timestamp() keeps created_at distinct for rows written in one transaction
    "CREATE TABLE IF NOT EXISTS event_outbox (
        tx_hash VARCHAR(66) NOT NULL,
        log_index BIGINT NOT NULL,
        event_type VARCHAR(32) NOT NULL,
        status VARCHAR(16) NOT NULL DEFAULT 'unsent'
            CHECK (status IN ('unsent', 'processing', 'sent')),
        block_number BIGINT NOT NULL,
        tx_date TIMESTAMPTZ NOT NULL,
        wallet_address VARCHAR(42) NOT NULL,
        event_data JSONB NOT NULL,
        amount NUMERIC NOT NULL,
        from_asset VARCHAR(64) NOT NULL,
        to_asset VARCHAR(64) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),
        claimed_at TIMESTAMPTZ,
        PRIMARY KEY (tx_hash, log_index)
    )",
    "CREATE INDEX IF NOT EXISTS idx_event_outbox_unsent
        ON event_outbox (created_at, block_number, log_index)
        WHERE status = 'unsent'",
    "CREATE INDEX IF NOT EXISTS idx_event_outbox_processing
        ON event_outbox (claimed_at)
        WHERE status = 'processing'",
    "CREATE INDEX IF NOT EXISTS idx_event_outbox_processing_wallet
        ON event_outbox (wallet_address)
        WHERE status = 'processing'",
    "CREATE TABLE IF NOT EXISTS orders (
        order_id UUID PRIMARY KEY,
        tx_hash VARCHAR(66) NOT NULL,
        log_index BIGINT NOT NULL,
        block_number BIGINT NOT NULL,
        tx_date TIMESTAMPTZ NOT NULL,
        transfer_type VARCHAR(16) NOT NULL
            CHECK (transfer_type IN ('deposit', 'withdrawal')),
        status VARCHAR(16) NOT NULL
            CHECK (status IN ('completed', 'in_progress')),
        wallet_address VARCHAR(42) NOT NULL,
        amount NUMERIC NOT NULL,
        from_asset VARCHAR(64) NOT NULL,
        to_asset VARCHAR(64) NOT NULL,
        estimated_amount NUMERIC,
        completion_tx_hash VARCHAR(66),
        completion_log_index BIGINT,
        UNIQUE (tx_hash, log_index)
    )",
    "CREATE INDEX IF NOT EXISTS idx_orders_wallet_type_status_date
        ON orders (wallet_address, transfer_type, status, tx_date DESC)",
    "CREATE INDEX IF NOT EXISTS idx_orders_completion
        ON orders (completion_tx_hash, completion_log_index)",
    // at most one open withdrawal per wallet
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_one_in_progress_withdrawal
        ON orders (wallet_address)
        WHERE transfer_type = 'withdrawal' AND status = 'in_progress'",
];

/// Creates the schema if missing and seeds the scan cursor with `start_block`.
/// An existing cursor is left untouched.
pub async fn run_migrations(pool: &PgPool, start_block: u64) -> Result<(), StoreError> {
    info!("Running database migrations...");

    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    let seeded = sqlx::query(
        "INSERT INTO crawler_state (id, last_processed_block)
         VALUES (1, $1)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(to_db_int(start_block)?)
    .execute(pool)
    .await?;

    if seeded.rows_affected() > 0 {
        info!("Seeded scan cursor at block {}", start_block);
    }

    info!("Database migrations completed successfully");
    Ok(())
}
