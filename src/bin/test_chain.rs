use std::sync::Arc;

use tracing::{error, info, Level};
use vault_indexer::{
    blockchain::{processor::event_topics, ChainReader},
    config::Config,
    db::{connection, PgStore},
    ChainScanner, EvmClient,
};

// Dry-run scan: prints the safe head and resolves the last finalized chunk against the
// live watch-list without touching the outbox or the cursor.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting chain smoke test...");

    let config = Config::from_env()?;
    let client = Arc::new(EvmClient::new(&config)?);

    let latest = client.latest_block().await?;
    let safe_block = latest.saturating_sub(config.finality_offset);
    info!("✅ Latest block: {}, safe block: {}", latest, safe_block);

    let from_block = safe_block.saturating_sub(config.chunk_size - 1);
    let logs = client
        .get_logs(
            from_block,
            safe_block,
            &[config.teller_address, config.atomic_queue_address],
            &event_topics(),
        )
        .await?;
    info!("✅ {} vault logs in blocks {}-{}", logs.len(), from_block, safe_block);

    let db_pool = connection::establish_connection(&config).await?;
    let store = Arc::new(PgStore::new(db_pool.clone()));
    let scanner = ChainScanner::new(&config, client, store.clone(), store.clone(), store);

    match scanner.resolve_range(from_block, safe_block).await {
        Ok(events) => {
            info!("✅ Resolved {} events for monitored wallets", events.len());
            for event in events {
                info!(
                    "   {} {}:{} wallet={} amount={} {} -> {}",
                    event.event_type(),
                    event.tx_hash,
                    event.log_index,
                    event.wallet_address,
                    event.amount,
                    event.from_asset,
                    event.to_asset
                );
            }
        }
        Err(e) => error!("❌ Failed to resolve chunk: {}", e),
    }

    db_pool.close().await;
    info!("Chain smoke test finished");
    Ok(())
}
