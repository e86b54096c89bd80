//! Turns a raw vault log into a typed event, applying the per-contract business filters.
//! Chain lookups (receipt status, block time) and the watch-list check live in the scanner.

use crate::assets;
use crate::blockchain::events::{AtomicRequestFulfilled, AtomicRequestUpdated, Deposit};
use crate::blockchain::models::LogEntry;
use crate::config::Config;
use crate::models::amount::format_units;
use crate::models::{
    ChainEvent, DepositPayload, EventPayload, WithdrawalFulfilledPayload, WithdrawalRequestPayload,
};
use alloy_primitives::{Address, B256};
use alloy_sol_types::SolEvent;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Failed to decode {event} log {tx_hash}:{log_index}: {reason}")]
pub struct DecodeError {
    pub event: &'static str,
    pub tx_hash: B256,
    pub log_index: u64,
    pub reason: String,
}

/// Contracts the scanner queries and the vault share token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultContracts {
    pub teller: Address,
    pub atomic_queue: Address,
    pub vault: Address,
}

impl VaultContracts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            teller: config.teller_address,
            atomic_queue: config.atomic_queue_address,
            vault: config.vault_address,
        }
    }

    pub fn addresses(&self) -> [Address; 2] {
        [self.teller, self.atomic_queue]
    }
}

/// First-topic signatures of every event we index.
pub fn event_topics() -> [B256; 3] {
    [
        Deposit::SIGNATURE_HASH,
        AtomicRequestUpdated::SIGNATURE_HASH,
        AtomicRequestFulfilled::SIGNATURE_HASH,
    ]
}

/// A decoded log that passed the contract-level filters but still needs the watch-list,
/// receipt and block-time checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub wallet_address: String,
    pub amount: String,
    pub from_asset: String,
    pub to_asset: String,
    pub payload: EventPayload,
}

impl DecodedLog {
    pub fn into_event(self, log: &LogEntry, tx_date: DateTime<Utc>) -> ChainEvent {
        ChainEvent {
            tx_hash: format!("{:#x}", log.transaction_hash),
            log_index: log.log_index,
            block_number: log.block_number,
            tx_date,
            wallet_address: self.wallet_address,
            amount: self.amount,
            from_asset: self.from_asset,
            to_asset: self.to_asset,
            payload: self.payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownTopic,
    UnexpectedEmitter,
    UnsupportedDepositAsset,
    NotVaultWithdrawal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Event(DecodedLog),
    Skipped(SkipReason),
}

fn checksum(address: &Address) -> String {
    address.to_checksum(None)
}

pub fn decode_log(log: &LogEntry, contracts: &VaultContracts) -> Result<Resolved, DecodeError> {
    let Some(topic0) = log.topics.first().copied() else {
        return Ok(Resolved::Skipped(SkipReason::UnknownTopic));
    };

    let decode_error = |event: &'static str, err: alloy_sol_types::Error| DecodeError {
        event,
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
        reason: err.to_string(),
    };

    if topic0 == Deposit::SIGNATURE_HASH {
        if log.address != contracts.teller {
            return Ok(Resolved::Skipped(SkipReason::UnexpectedEmitter));
        }
        let event = Deposit::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| decode_error("Deposit", e))?;
        return Ok(resolve_deposit(event, contracts));
    }

    if topic0 == AtomicRequestUpdated::SIGNATURE_HASH {
        if log.address != contracts.atomic_queue {
            return Ok(Resolved::Skipped(SkipReason::UnexpectedEmitter));
        }
        let event = AtomicRequestUpdated::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| decode_error("AtomicRequestUpdated", e))?;
        return Ok(resolve_request(event, contracts));
    }

    if topic0 == AtomicRequestFulfilled::SIGNATURE_HASH {
        if log.address != contracts.atomic_queue {
            return Ok(Resolved::Skipped(SkipReason::UnexpectedEmitter));
        }
        let event = AtomicRequestFulfilled::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| decode_error("AtomicRequestFulfilled", e))?;
        return Ok(resolve_fulfilled(event));
    }

    Ok(Resolved::Skipped(SkipReason::UnknownTopic))
}

fn resolve_deposit(event: Deposit, contracts: &VaultContracts) -> Resolved {
    let Some(asset) = assets::by_address(&event.depositAsset) else {
        return Resolved::Skipped(SkipReason::UnsupportedDepositAsset);
    };

    Resolved::Event(DecodedLog {
        wallet_address: checksum(&event.receiver),
        amount: format_units(event.depositAmount, asset.decimals),
        from_asset: asset.symbol.to_string(),
        to_asset: assets::display_name(&contracts.vault),
        payload: EventPayload::Deposit(DepositPayload {
            nonce: event.nonce.to_string(),
            receiver: checksum(&event.receiver),
            deposit_asset: checksum(&event.depositAsset),
            deposit_amount: event.depositAmount.to_string(),
            share_amount: event.shareAmount.to_string(),
            deposit_timestamp: event.depositTimestamp.to_string(),
            share_lock_period_at_time_of_deposit: event.shareLockPeriodAtTimeOfDeposit.to_string(),
        }),
    })
}

fn resolve_request(event: AtomicRequestUpdated, contracts: &VaultContracts) -> Resolved {
    if event.offerToken != contracts.vault {
        return Resolved::Skipped(SkipReason::NotVaultWithdrawal);
    }

    Resolved::Event(DecodedLog {
        wallet_address: checksum(&event.user),
        amount: format_units(event.amount, assets::decimals_of(&event.offerToken)),
        from_asset: assets::display_name(&event.offerToken),
        to_asset: assets::display_name(&event.wantToken),
        payload: EventPayload::WithdrawalRequested(WithdrawalRequestPayload {
            user: checksum(&event.user),
            offer_token: checksum(&event.offerToken),
            want_token: checksum(&event.wantToken),
            amount: event.amount.to_string(),
            deadline: event.deadline.to_string(),
            min_price: event.minPrice.to_string(),
            timestamp: event.timestamp.to_string(),
        }),
    })
}

// Recorded for any offer/want pair; the materializer decides what it closes.
fn resolve_fulfilled(event: AtomicRequestFulfilled) -> Resolved {
    Resolved::Event(DecodedLog {
        wallet_address: checksum(&event.user),
        amount: format_units(event.wantAmountReceived, assets::decimals_of(&event.wantToken)),
        from_asset: assets::display_name(&event.offerToken),
        to_asset: assets::display_name(&event.wantToken),
        payload: EventPayload::WithdrawalCompleted(WithdrawalFulfilledPayload {
            user: checksum(&event.user),
            offer_token: checksum(&event.offerToken),
            want_token: checksum(&event.wantToken),
            offer_amount_spent: event.offerAmountSpent.to_string(),
            want_amount_received: event.wantAmountReceived.to_string(),
            timestamp: event.timestamp.to_string(),
        }),
    })
}
