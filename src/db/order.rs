use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{from_db_int, to_db_int, StoreError};
use crate::models::Order;

const ORDER_COLUMNS: &str = "order_id, tx_hash, log_index, block_number, tx_date, transfer_type, status,
    wallet_address, amount::TEXT AS amount, from_asset, to_asset,
    estimated_amount::TEXT AS estimated_amount, completion_tx_hash, completion_log_index";

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: Uuid,
    tx_hash: String,
    log_index: i64,
    block_number: i64,
    tx_date: DateTime<Utc>,
    transfer_type: String,
    status: String,
    wallet_address: String,
    amount: String,
    from_asset: String,
    to_asset: String,
    estimated_amount: Option<String>,
    completion_tx_hash: Option<String>,
    completion_log_index: Option<i64>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            order_id: row.order_id,
            tx_hash: row.tx_hash,
            log_index: from_db_int(row.log_index)?,
            block_number: from_db_int(row.block_number)?,
            tx_date: row.tx_date,
            transfer_type: row.transfer_type.parse()?,
            status: row.status.parse()?,
            wallet_address: row.wallet_address,
            amount: row.amount,
            from_asset: row.from_asset,
            to_asset: row.to_asset,
            estimated_amount: row.estimated_amount,
            completion_tx_hash: row.completion_tx_hash,
            completion_log_index: row.completion_log_index.map(from_db_int).transpose()?,
        })
    }
}

async fn fetch_one_order(
    pool: &PgPool,
    filter: &str,
    binds: &[&str],
    int_bind: Option<i64>,
) -> Result<Option<Order>, StoreError> {
    let query = format!("SELECT {ORDER_COLUMNS} FROM orders {filter} LIMIT 1");
    let mut q = sqlx::query_as::<_, OrderRow>(&query);
    for value in binds {
        q = q.bind(*value);
    }
    if let Some(value) = int_bind {
        q = q.bind(value);
    }

    q.fetch_optional(pool)
        .await?
        .map(Order::try_from)
        .transpose()
}

/// Keyed by `(tx_hash, log_index)`. An existing row keeps its `order_id`.
pub async fn upsert_order(pool: &PgPool, order: &Order) -> Result<(), StoreError> {
    let completion_log_index = order.completion_log_index.map(to_db_int).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO orders
            (order_id, tx_hash, log_index, block_number, tx_date, transfer_type, status,
             wallet_address, amount, from_asset, to_asset, estimated_amount,
             completion_tx_hash, completion_log_index)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::NUMERIC, $10, $11, $12::NUMERIC, $13, $14)
        ON CONFLICT (tx_hash, log_index) DO UPDATE SET
            block_number = EXCLUDED.block_number,
            tx_date = EXCLUDED.tx_date,
            transfer_type = EXCLUDED.transfer_type,
            status = EXCLUDED.status,
            wallet_address = EXCLUDED.wallet_address,
            amount = EXCLUDED.amount,
            from_asset = EXCLUDED.from_asset,
            to_asset = EXCLUDED.to_asset,
            estimated_amount = EXCLUDED.estimated_amount,
            completion_tx_hash = EXCLUDED.completion_tx_hash,
            completion_log_index = EXCLUDED.completion_log_index
        "#,
    )
    .bind(order.order_id)
    .bind(&order.tx_hash)
    .bind(to_db_int(order.log_index)?)
    .bind(to_db_int(order.block_number)?)
    .bind(order.tx_date)
    .bind(order.transfer_type.as_str())
    .bind(order.status.as_str())
    .bind(&order.wallet_address)
    .bind(&order.amount)
    .bind(&order.from_asset)
    .bind(&order.to_asset)
    .bind(order.estimated_amount.as_deref())
    .bind(order.completion_tx_hash.as_deref())
    .bind(completion_log_index)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_order(pool: &PgPool, order: &Order) -> Result<(), StoreError> {
    let completion_log_index = order.completion_log_index.map(to_db_int).transpose()?;

    sqlx::query(
        r#"
        UPDATE orders SET
            tx_hash = $2,
            log_index = $3,
            block_number = $4,
            tx_date = $5,
            transfer_type = $6,
            status = $7,
            wallet_address = $8,
            amount = $9::NUMERIC,
            from_asset = $10,
            to_asset = $11,
            estimated_amount = $12::NUMERIC,
            completion_tx_hash = $13,
            completion_log_index = $14
        WHERE order_id = $1
        "#,
    )
    .bind(order.order_id)
    .bind(&order.tx_hash)
    .bind(to_db_int(order.log_index)?)
    .bind(to_db_int(order.block_number)?)
    .bind(order.tx_date)
    .bind(order.transfer_type.as_str())
    .bind(order.status.as_str())
    .bind(&order.wallet_address)
    .bind(&order.amount)
    .bind(&order.from_asset)
    .bind(&order.to_asset)
    .bind(order.estimated_amount.as_deref())
    .bind(order.completion_tx_hash.as_deref())
    .bind(completion_log_index)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_order_by_key(pool: &PgPool, tx_hash: &str, log_index: u64) -> Result<Option<Order>, StoreError> {
    fetch_one_order(
        pool,
        "WHERE tx_hash = $1 AND log_index = $2",
        &[tx_hash],
        Some(to_db_int(log_index)?),
    )
    .await
}

pub async fn get_order_by_completion(
    pool: &PgPool,
    tx_hash: &str,
    log_index: u64,
) -> Result<Option<Order>, StoreError> {
    fetch_one_order(
        pool,
        "WHERE completion_tx_hash = $1 AND completion_log_index = $2",
        &[tx_hash],
        Some(to_db_int(log_index)?),
    )
    .await
}

pub async fn get_last_in_progress_withdrawal(
    pool: &PgPool,
    wallet_address: &str,
) -> Result<Option<Order>, StoreError> {
    fetch_one_order(
        pool,
        "WHERE wallet_address = $1 AND transfer_type = 'withdrawal' AND status = 'in_progress'
         ORDER BY tx_date DESC, block_number DESC, log_index DESC",
        &[wallet_address],
        None,
    )
    .await
}

/// Amounts compare numerically, so `"1"` matches a stored `1.0`.
pub async fn get_in_progress_withdrawal_by_amount(
    pool: &PgPool,
    wallet_address: &str,
    amount: &str,
) -> Result<Option<Order>, StoreError> {
    fetch_one_order(
        pool,
        "WHERE wallet_address = $1 AND amount = $2::NUMERIC
           AND transfer_type = 'withdrawal' AND status = 'in_progress'
         ORDER BY tx_date DESC, block_number DESC, log_index DESC",
        &[wallet_address, amount],
        None,
    )
    .await
}

pub async fn get_order_by_tx_hash(pool: &PgPool, tx_hash: &str) -> Result<Option<Order>, StoreError> {
    fetch_one_order(
        pool,
        "WHERE tx_hash = $1 OR completion_tx_hash = $1
         ORDER BY (tx_hash = $1) DESC, log_index",
        &[tx_hash],
        None,
    )
    .await
}
