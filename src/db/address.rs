use sqlx::{PgPool, Row};

use crate::models::MonitoredAddress;

/// Returns `true` when the wallet was not registered for this chain before.
pub async fn add_address(pool: &PgPool, wallet_address: &str, chain_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO monitored_addresses (wallet_address, chain_id)
         VALUES ($1, $2)
         ON CONFLICT (wallet_address, chain_id) DO NOTHING",
    )
    .bind(wallet_address)
    .bind(chain_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn is_address_monitored(pool: &PgPool, wallet_address: &str, chain_id: i64) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "SELECT 1 FROM monitored_addresses WHERE wallet_address = $1 AND chain_id = $2",
    )
    .bind(wallet_address)
    .bind(chain_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

pub async fn get_monitored_addresses(pool: &PgPool, chain_id: i64) -> Result<Vec<MonitoredAddress>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, wallet_address, chain_id, created_at
         FROM monitored_addresses
         WHERE chain_id = $1
         ORDER BY id",
    )
    .bind(chain_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| MonitoredAddress {
            id: row.get("id"),
            wallet_address: row.get("wallet_address"),
            chain_id: row.get("chain_id"),
            created_at: row.get("created_at"),
        })
        .collect())
}
