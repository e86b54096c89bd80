//! Partitioned, ordered message bus between the outbox publisher and the materializer.

pub mod kafka;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use kafka::{KafkaConsumer, KafkaProducer};

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("No acknowledgment within {0:?}")]
    Timeout(Duration),

    #[error("Bus closed")]
    Closed,
}

/// A message read from the bus, detached from the client that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait BusProducer: Send + Sync {
    /// Publishes `payload` on the partition chosen by `key` and returns only once the
    /// broker has durably acknowledged it.
    async fn send(&self, key: &str, payload: &[u8]) -> Result<(), BusError>;
}

#[async_trait]
pub trait BusConsumer: Send + Sync {
    /// Next message in partition order. Waits until one is available.
    async fn next(&self) -> Result<Delivery, BusError>;

    /// Records `delivery` as processed for the consumer group.
    async fn commit(&self, delivery: &Delivery) -> Result<(), BusError>;

    /// Makes `delivery` the next message `next` returns for its partition.
    async fn rewind(&self, delivery: &Delivery) -> Result<(), BusError>;
}
