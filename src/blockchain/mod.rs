pub mod client;
pub mod events;
pub mod models;
pub mod processor;
pub mod scanner;

pub use client::{ChainReader, ClientError, EvmClient};
pub use scanner::{ChainScanner, ScanError};
