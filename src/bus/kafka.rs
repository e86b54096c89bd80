use super::{BusConsumer, BusError, BusProducer, Delivery};
use crate::config::Config;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, info};

pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaProducer {
    /// Idempotent producer with `acks=all`, so per-key order survives internal retries.
    pub fn new(config: &Config) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("retries", "3")
            .set("retry.backoff.ms", "100")
            .set("message.timeout.ms", config.bus_timeout.as_millis().to_string())
            .create()?;

        info!("Kafka producer ready for topic {}", config.kafka_topic);

        Ok(Self {
            producer,
            topic: config.kafka_topic.clone(),
            timeout: config.bus_timeout,
        })
    }
}

#[async_trait]
impl BusProducer for KafkaProducer {
    async fn send(&self, key: &str, payload: &[u8]) -> Result<(), BusError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                debug!(key, partition, offset, "Message acknowledged");
                Ok(())
            }
            Err((KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut), _)) => {
                Err(BusError::Timeout(self.timeout))
            }
            Err((err, _)) => Err(BusError::Kafka(err)),
        }
    }
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
    timeout: Duration,
}

impl KafkaConsumer {
    /// Manual commits only; a new group starts from the earliest retained offset.
    pub fn new(config: &Config) -> Result<Self, BusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("group.id", &config.kafka_group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .create()?;

        consumer.subscribe(&[config.kafka_topic.as_str()])?;
        info!(
            "Kafka consumer subscribed to {} as group {}",
            config.kafka_topic, config.kafka_group_id
        );

        Ok(Self {
            consumer,
            topic: config.kafka_topic.clone(),
            timeout: config.bus_timeout,
        })
    }
}

#[async_trait]
impl BusConsumer for KafkaConsumer {
    async fn next(&self) -> Result<Delivery, BusError> {
        let message = self.consumer.recv().await?;

        Ok(Delivery {
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(|key| String::from_utf8_lossy(key).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&self, delivery: &Delivery) -> Result<(), BusError> {
        // the committed offset is the next one to read; Async enqueues without blocking the runtime
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(&self.topic, delivery.partition, Offset::Offset(delivery.offset + 1))?;
        self.consumer.commit(&offsets, CommitMode::Async)?;
        Ok(())
    }

    async fn rewind(&self, delivery: &Delivery) -> Result<(), BusError> {
        self.consumer.seek(
            &self.topic,
            delivery.partition,
            Offset::Offset(delivery.offset),
            Timeout::After(self.timeout),
        )?;
        Ok(())
    }
}
