use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vault_indexer::{
    api, bus,
    config::Config,
    db::{self, PgStore},
    state::AppState,
    ChainScanner, EvmClient, OutboxPublisher, TransferMaterializer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vault-indexer");

    let config = Config::from_env()?;
    info!(
        chain_id = config.chain_id,
        finality_offset = config.finality_offset,
        chunk_size = config.chunk_size,
        topic = %config.kafka_topic,
        "Configuration loaded"
    );

    let db_pool = db::connection::establish_connection(&config).await?;
    db::migration::run_migrations(&db_pool, config.start_block).await?;

    let store = Arc::new(PgStore::new(db_pool.clone()));
    let chain = Arc::new(EvmClient::new(&config)?);
    let producer = Arc::new(bus::KafkaProducer::new(&config)?);
    let consumer = Arc::new(bus::KafkaConsumer::new(&config)?);

    let shutdown = CancellationToken::new();

    let scanner = ChainScanner::new(&config, chain, store.clone(), store.clone(), store.clone());
    let scanner_handle = {
        let shutdown = shutdown.clone();
        let every = config.scan_interval;
        tokio::spawn(async move { scanner.run(every, shutdown).await })
    };

    let publisher = OutboxPublisher::new(&config, store.clone(), producer);
    let publisher_handle = {
        let shutdown = shutdown.clone();
        let every = config.publish_interval;
        tokio::spawn(async move { publisher.run(every, shutdown).await })
    };

    let materializer = TransferMaterializer::new(consumer, store.clone());
    let materializer_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { materializer.run(shutdown).await })
    };

    let app_state = Arc::new(AppState {
        config: config.clone(),
        addresses: store.clone(),
        orders: store.clone(),
    });
    let app = api::create_router(app_state);
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    let server_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping components");
    shutdown.cancel();

    let (scanner, publisher, materializer) =
        tokio::join!(scanner_handle, publisher_handle, materializer_handle);
    for (name, result) in [("scanner", scanner), ("publisher", publisher), ("materializer", materializer)] {
        if let Err(e) = result {
            error!("{} task ended abnormally: {}", name, e);
        }
    }

    match server_handle.await {
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task ended abnormally: {}", e),
        Ok(Ok(())) => {}
    }

    db_pool.close().await;
    info!("vault-indexer stopped");
    Ok(())
}
