// Domain records shared by the scanner, the outbox publisher and the materializer.

pub mod amount;
pub mod message;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub use message::TransferMessage;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Closed string-backed enums persisted as TEXT and carried on the bus.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseEnumError { kind: $kind, value: s.to_string() }),
                }
            }
        }
    };
}

text_enum!(EventType, "event type", {
    Deposit => "deposit",
    WithdrawalRequested => "withdrawal_requested",
    WithdrawalCompleted => "withdrawal_completed",
});

text_enum!(OutboxStatus, "outbox status", {
    Unsent => "unsent",
    Processing => "processing",
    Sent => "sent",
});

text_enum!(TransferType, "transfer type", {
    Deposit => "deposit",
    Withdrawal => "withdrawal",
});

text_enum!(OrderStatus, "order status", {
    Completed => "completed",
    InProgress => "in_progress",
});

/// Teller `Deposit` fields, integers kept as decimal strings in native units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositPayload {
    pub nonce: String,
    pub receiver: String,
    pub deposit_asset: String,
    pub deposit_amount: String,
    pub share_amount: String,
    pub deposit_timestamp: String,
    pub share_lock_period_at_time_of_deposit: String,
}

/// Atomic queue `AtomicRequestUpdated` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequestPayload {
    pub user: String,
    pub offer_token: String,
    pub want_token: String,
    pub amount: String,
    pub deadline: String,
    /// Want-token price per offer token, scaled by 10^8.
    pub min_price: String,
    pub timestamp: String,
}

/// Atomic queue `AtomicRequestFulfilled` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalFulfilledPayload {
    pub user: String,
    pub offer_token: String,
    pub want_token: String,
    pub offer_amount_spent: String,
    pub want_amount_received: String,
    pub timestamp: String,
}

/// Protocol payload of one on-chain occurrence. The variant is the event type; on the
/// wire and in the outbox only the inner fields are stored next to an `event_type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Deposit(DepositPayload),
    WithdrawalRequested(WithdrawalRequestPayload),
    WithdrawalCompleted(WithdrawalFulfilledPayload),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Deposit(_) => EventType::Deposit,
            EventPayload::WithdrawalRequested(_) => EventType::WithdrawalRequested,
            EventPayload::WithdrawalCompleted(_) => EventType::WithdrawalCompleted,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_value(event_type: EventType, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match event_type {
            EventType::Deposit => EventPayload::Deposit(serde_json::from_value(value)?),
            EventType::WithdrawalRequested => {
                EventPayload::WithdrawalRequested(serde_json::from_value(value)?)
            }
            EventType::WithdrawalCompleted => {
                EventPayload::WithdrawalCompleted(serde_json::from_value(value)?)
            }
        })
    }
}

/// A resolved vault log for a monitored wallet, ready for the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub tx_hash: String,
    pub log_index: u64,
    pub block_number: u64,
    pub tx_date: DateTime<Utc>,
    pub wallet_address: String,
    /// Unit-adjusted decimal string.
    pub amount: String,
    pub from_asset: String,
    pub to_asset: String,
    pub payload: EventPayload,
}

impl ChainEvent {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// An outbox row as read back by the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEvent {
    pub event: ChainEvent,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
}

/// Materialized, user-visible transfer lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub order_id: Uuid,
    pub tx_hash: String,
    pub log_index: u64,
    pub block_number: u64,
    pub tx_date: DateTime<Utc>,
    pub transfer_type: TransferType,
    pub status: OrderStatus,
    pub wallet_address: String,
    pub amount: String,
    pub from_asset: String,
    pub to_asset: String,
    pub estimated_amount: Option<String>,
    /// Fulfillment log that closed a withdrawal, if any.
    pub completion_tx_hash: Option<String>,
    pub completion_log_index: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredAddress {
    pub id: i64,
    pub wallet_address: String,
    pub chain_id: i64,
    pub created_at: DateTime<Utc>,
}
