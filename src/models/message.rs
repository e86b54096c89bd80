use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EventPayload, EventType, OutboxEvent};

/// Transfer event as published to the bus, keyed by `wallet_address`.
///
/// Unknown fields are ignored on decode so producers can add fields without
/// breaking running consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferMessage {
    pub event_type: EventType,
    pub tx_hash: String,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_date: DateTime<Utc>,
    pub wallet_address: String,
    pub event_data: Value,
    pub amount: String,
    pub from_asset: String,
    pub to_asset: String,
    pub published_at: DateTime<Utc>,
}

impl TransferMessage {
    pub fn from_outbox(
        row: &OutboxEvent,
        published_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let event = &row.event;
        Ok(Self {
            event_type: event.event_type(),
            tx_hash: event.tx_hash.clone(),
            block_number: event.block_number,
            log_index: event.log_index,
            tx_date: event.tx_date,
            wallet_address: event.wallet_address.clone(),
            event_data: event.payload.to_value()?,
            amount: event.amount.clone(),
            from_asset: event.from_asset.clone(),
            to_asset: event.to_asset.clone(),
            published_at,
        })
    }

    /// Typed view of `event_data` for this message's event type.
    pub fn payload(&self) -> Result<EventPayload, serde_json::Error> {
        EventPayload::from_value(self.event_type, self.event_data.clone())
    }

    pub fn partition_key(&self) -> &str {
        &self.wallet_address
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
