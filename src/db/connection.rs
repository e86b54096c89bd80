use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use tracing::info;

use crate::config::Config;

const MAX_CONNECTIONS: u32 = 10;

/// Opens the Postgres pool. Every connection carries a `statement_timeout` equal to the
/// configured database timeout, and acquiring a connection is bounded by the same value.
pub async fn establish_connection(config: &Config) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(&config.database_url)?.options([(
        "statement_timeout",
        config.db_timeout.as_millis().to_string(),
    )]);

    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(config.db_timeout)
        .connect_with(options)
        .await?;

    info!("Connected to Postgres (max {} connections)", MAX_CONNECTIONS);
    Ok(pool)
}
