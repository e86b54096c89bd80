//! Consumes transfer messages in partition order and maintains the `orders` read model.
//!
//! Per wallet the withdrawal track is `none -> in_progress -> completed`. Repeated request
//! updates collapse into the open row; a completion with no open row creates a completed
//! order directly.

use crate::bus::{BusConsumer, BusError, Delivery};
use crate::db::{OrderStore, StoreError};
use crate::models::amount::{estimate_withdrawal, AmountError};
use crate::models::{
    EventPayload, Order, OrderStatus, TransferMessage, TransferType, WithdrawalRequestPayload,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid amount in {tx_hash}:{log_index}: {source}")]
    Amount {
        tx_hash: String,
        log_index: u64,
        #[source]
        source: AmountError,
    },
}

/// Effect of one message on the order table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    DepositRecorded,
    RequestOpened,
    RequestRevised,
    /// Replay of a request that already completed, or older than the open request.
    RequestIgnored,
    WithdrawalCompleted,
    /// Completion without an open request.
    CompletionRecorded,
    CompletionIgnored,
}

pub struct TransferMaterializer {
    consumer: Arc<dyn BusConsumer>,
    orders: Arc<dyn OrderStore>,
    retry_delay: Duration,
}

impl TransferMaterializer {
    pub fn new(consumer: Arc<dyn BusConsumer>, orders: Arc<dyn OrderStore>) -> Self {
        Self {
            consumer,
            orders,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Pull loop. A message's offset is committed only after it has been applied; on
    /// failure the consumer is rewound to it and it is retried after a pause.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting transfer materializer");

        loop {
            let next = tokio::select! {
                next = self.consumer.next() => next,
                _ = shutdown.cancelled() => break,
            };

            match next {
                Ok(delivery) => {
                    if !self.handle(&delivery).await && !self.pause(&shutdown).await {
                        break;
                    }
                }
                Err(BusError::Closed) => {
                    info!("Message bus closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read from message bus: {}", e);
                    if !self.pause(&shutdown).await {
                        break;
                    }
                }
            }
        }

        info!("Shutting down transfer materializer");
    }

    /// Returns `false` when the message has to be retried.
    async fn handle(&self, delivery: &Delivery) -> bool {
        match self.process(delivery).await {
            Ok(applied) => {
                debug!(partition = delivery.partition, offset = delivery.offset, ?applied, "Applied message");
                // a lost commit only means a replay, which the order writes absorb
                if let Err(e) = self.consumer.commit(delivery).await {
                    warn!(partition = delivery.partition, offset = delivery.offset, "Offset commit failed: {}", e);
                }
                true
            }
            Err(e) => {
                error!(
                    partition = delivery.partition,
                    offset = delivery.offset,
                    key = delivery.key.as_deref().unwrap_or_default(),
                    "Failed to apply transfer message, will retry: {}", e
                );
                if let Err(e) = self.consumer.rewind(delivery).await {
                    error!("Failed to rewind consumer: {}", e);
                }
                false
            }
        }
    }

    async fn pause(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.retry_delay) => true,
            _ = shutdown.cancelled() => false,
        }
    }

    pub async fn process(&self, delivery: &Delivery) -> Result<Applied, MaterializeError> {
        let message = TransferMessage::from_bytes(&delivery.payload)?;
        self.apply(&message).await
    }

    pub async fn apply(&self, message: &TransferMessage) -> Result<Applied, MaterializeError> {
        match message.payload()? {
            EventPayload::Deposit(_) => self.apply_deposit(message).await,
            EventPayload::WithdrawalRequested(payload) => self.apply_request(message, &payload).await,
            EventPayload::WithdrawalCompleted(_) => self.apply_completion(message).await,
        }
    }

    async fn apply_deposit(&self, message: &TransferMessage) -> Result<Applied, MaterializeError> {
        let order = new_order(message, TransferType::Deposit, OrderStatus::Completed, None);
        self.orders.upsert_order(&order).await?;

        info!(tx_hash = %message.tx_hash, wallet = %message.wallet_address, amount = %message.amount, "Recorded deposit");
        Ok(Applied::DepositRecorded)
    }

    /// An open request for the wallet with a different amount is superseded in place.
    async fn apply_request(
        &self,
        message: &TransferMessage,
        payload: &WithdrawalRequestPayload,
    ) -> Result<Applied, MaterializeError> {
        let estimate = estimate_withdrawal(&message.amount, &payload.min_price).map_err(|source| {
            MaterializeError::Amount {
                tx_hash: message.tx_hash.clone(),
                log_index: message.log_index,
                source,
            }
        })?;

        if let Some(existing) = self.orders.find_by_key(&message.tx_hash, message.log_index).await? {
            if existing.status == OrderStatus::Completed {
                debug!(tx_hash = %message.tx_hash, "Request already completed, ignoring replay");
                return Ok(Applied::RequestIgnored);
            }
            self.orders.update_order(&revise(existing, message, estimate)).await?;
            return Ok(Applied::RequestRevised);
        }

        let open = match self
            .orders
            .in_progress_withdrawal_with_amount(&message.wallet_address, &message.amount)
            .await?
        {
            Some(open) => Some(open),
            None => self.orders.last_in_progress_withdrawal(&message.wallet_address).await?,
        };

        match open {
            Some(open) if (open.block_number, open.log_index) > (message.block_number, message.log_index) => {
                debug!(tx_hash = %message.tx_hash, open_tx_hash = %open.tx_hash, "Request older than open withdrawal, ignoring");
                Ok(Applied::RequestIgnored)
            }
            Some(open) => {
                info!(
                    wallet = %message.wallet_address,
                    old_tx_hash = %open.tx_hash,
                    new_tx_hash = %message.tx_hash,
                    amount = %message.amount,
                    "Updating in-progress withdrawal"
                );
                self.orders.update_order(&revise(open, message, estimate)).await?;
                Ok(Applied::RequestRevised)
            }
            None => {
                let order = new_order(message, TransferType::Withdrawal, OrderStatus::InProgress, estimate);
                self.orders.upsert_order(&order).await?;
                info!(wallet = %message.wallet_address, tx_hash = %message.tx_hash, amount = %message.amount, "Opened withdrawal request");
                Ok(Applied::RequestOpened)
            }
        }
    }

    async fn apply_completion(&self, message: &TransferMessage) -> Result<Applied, MaterializeError> {
        if self
            .orders
            .find_by_completion(&message.tx_hash, message.log_index)
            .await?
            .is_some()
            || self
                .orders
                .find_by_key(&message.tx_hash, message.log_index)
                .await?
                .is_some()
        {
            debug!(tx_hash = %message.tx_hash, "Completion already applied, ignoring replay");
            return Ok(Applied::CompletionIgnored);
        }

        match self.orders.last_in_progress_withdrawal(&message.wallet_address).await? {
            Some(mut open) => {
                open.status = OrderStatus::Completed;
                if open.estimated_amount.is_none() {
                    open.estimated_amount = Some(message.amount.clone());
                }
                open.completion_tx_hash = Some(message.tx_hash.clone());
                open.completion_log_index = Some(message.log_index);
                self.orders.update_order(&open).await?;

                info!(
                    wallet = %message.wallet_address,
                    withdrawal_tx_hash = %open.tx_hash,
                    completion_tx_hash = %message.tx_hash,
                    "Marked withdrawal as completed"
                );
                Ok(Applied::WithdrawalCompleted)
            }
            None => {
                let mut order = new_order(
                    message,
                    TransferType::Withdrawal,
                    OrderStatus::Completed,
                    Some(message.amount.clone()),
                );
                order.completion_tx_hash = Some(message.tx_hash.clone());
                order.completion_log_index = Some(message.log_index);
                self.orders.upsert_order(&order).await?;

                info!(wallet = %message.wallet_address, completion_tx_hash = %message.tx_hash, "Recorded completed withdrawal without request");
                Ok(Applied::CompletionRecorded)
            }
        }
    }
}

fn new_order(
    message: &TransferMessage,
    transfer_type: TransferType,
    status: OrderStatus,
    estimated_amount: Option<String>,
) -> Order {
    Order {
        order_id: Uuid::new_v4(),
        tx_hash: message.tx_hash.clone(),
        log_index: message.log_index,
        block_number: message.block_number,
        tx_date: message.tx_date,
        transfer_type,
        status,
        wallet_address: message.wallet_address.clone(),
        amount: message.amount.clone(),
        from_asset: message.from_asset.clone(),
        to_asset: message.to_asset.clone(),
        estimated_amount,
        completion_tx_hash: None,
        completion_log_index: None,
    }
}

/// Points an open withdrawal at the latest request update.
fn revise(mut open: Order, message: &TransferMessage, estimated_amount: Option<String>) -> Order {
    open.tx_hash = message.tx_hash.clone();
    open.log_index = message.log_index;
    open.block_number = message.block_number;
    open.tx_date = message.tx_date;
    open.amount = message.amount.clone();
    open.from_asset = message.from_asset.clone();
    open.to_asset = message.to_asset.clone();
    open.estimated_amount = estimated_amount;
    open
}
