pub mod api;
pub mod assets;
pub mod blockchain;
pub mod bus;
pub mod cache;
pub mod config;
pub mod db;
pub mod materializer;
pub mod models;
pub mod outbox;
pub mod state;
pub mod validation;

#[cfg(test)]
pub mod tests;

pub use api::error::ApiError;
pub use api::response::ApiResponse;
pub use api::route::create_router;
pub use blockchain::{ChainReader, ChainScanner, EvmClient};
pub use config::Config;
pub use db::PgStore;
pub use materializer::TransferMaterializer;
pub use outbox::OutboxPublisher;
