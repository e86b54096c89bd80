use sqlx::{PgPool, Row};

use super::{from_db_int, to_db_int, StoreError};

pub async fn get_last_processed_block(pool: &PgPool) -> Result<u64, StoreError> {
    let row = sqlx::query("SELECT last_processed_block FROM crawler_state WHERE id = 1")
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => from_db_int(row.get("last_processed_block")),
        None => Err(StoreError::Corrupt("crawler_state has no cursor row".to_string())),
    }
}

/// Compare-and-set. Only moves forward, and only from the value the caller read.
pub async fn advance_last_processed_block(pool: &PgPool, from: u64, to: u64) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE crawler_state
         SET last_processed_block = $2, updated_at = NOW()
         WHERE id = 1 AND last_processed_block = $1 AND $2 > $1",
    )
    .bind(to_db_int(from)?)
    .bind(to_db_int(to)?)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
