//! In-memory stand-ins for the chain, the Postgres stores and the message bus.

use crate::assets::{ATOMIC_QUEUE_ADDRESS, LBTC, LBTCV, TELLER_ADDRESS};
use crate::blockchain::client::{ChainReader, ClientError};
use crate::blockchain::events::{AtomicRequestFulfilled, AtomicRequestUpdated, Deposit};
use crate::blockchain::models::LogEntry;
use crate::blockchain::processor::{decode_log, Resolved, VaultContracts};
use crate::bus::{BusConsumer, BusError, BusProducer, Delivery};
use crate::config::Config;
use crate::db::{AddressStore, CursorStore, OrderStore, OutboxStore, StoreError};
use crate::models::{
    ChainEvent, EventType, Order, OrderStatus, OutboxEvent, OutboxStatus, TransferMessage, TransferType,
};
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const GENESIS_TIME: i64 = 1_700_000_000;
pub const BLOCK_TIME: i64 = 12;

pub fn test_config() -> Config {
    Config {
        rpc_url: "http://localhost:8545".to_string(),
        database_url: "postgres://localhost/vault_indexer_test".to_string(),
        kafka_brokers: "localhost:9092".to_string(),
        kafka_topic: "vault-transfers".to_string(),
        kafka_group_id: "transfer-materializer".to_string(),
        chain_id: 1,
        finality_offset: 32,
        chunk_size: 100,
        start_block: 0,
        scan_interval: Duration::from_millis(10),
        publish_interval: Duration::from_millis(10),
        publish_batch_size: 100,
        outbox_reclaim_after: Duration::from_secs(300),
        rpc_timeout: Duration::from_secs(5),
        rpc_rate_limit: 100,
        db_timeout: Duration::from_secs(5),
        bus_timeout: Duration::from_secs(5),
        monitored_cache_ttl: Duration::from_secs(60),
        teller_address: TELLER_ADDRESS,
        atomic_queue_address: ATOMIC_QUEUE_ADDRESS,
        vault_address: LBTCV.address,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
    }
}

pub fn wallet(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn tx(byte: u8) -> B256 {
    B256::repeat_byte(byte)
}

pub fn block_time(block_number: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(GENESIS_TIME + block_number as i64 * BLOCK_TIME, 0)
        .single()
        .expect("valid timestamp")
}

fn entry<E: SolEvent>(emitter: Address, event: &E, block_number: u64, log_index: u64, tx_hash: B256) -> LogEntry {
    let data = event.encode_log_data();
    LogEntry {
        address: emitter,
        topics: data.topics().to_vec(),
        data: data.data.clone(),
        block_number,
        transaction_hash: tx_hash,
        log_index,
        removed: false,
    }
}

pub fn deposit_log(
    block_number: u64,
    log_index: u64,
    tx_hash: B256,
    receiver: Address,
    asset: Address,
    amount: u64,
) -> LogEntry {
    let event = Deposit {
        nonce: U256::from(log_index + 1),
        receiver,
        depositAsset: asset,
        depositAmount: U256::from(amount),
        shareAmount: U256::from(amount),
        depositTimestamp: U256::from(GENESIS_TIME as u64),
        shareLockPeriodAtTimeOfDeposit: U256::ZERO,
    };
    entry(TELLER_ADDRESS, &event, block_number, log_index, tx_hash)
}

pub fn request_log(
    block_number: u64,
    log_index: u64,
    tx_hash: B256,
    user: Address,
    offer_token: Address,
    amount: u64,
    min_price: u64,
) -> LogEntry {
    let event = AtomicRequestUpdated {
        user,
        offerToken: offer_token,
        wantToken: LBTC.address,
        amount: U256::from(amount),
        deadline: U256::from(GENESIS_TIME as u64 + 86_400),
        minPrice: U256::from(min_price),
        timestamp: U256::from(GENESIS_TIME as u64),
    };
    entry(ATOMIC_QUEUE_ADDRESS, &event, block_number, log_index, tx_hash)
}

pub fn fulfilled_log(
    block_number: u64,
    log_index: u64,
    tx_hash: B256,
    user: Address,
    offer_spent: u64,
    want_received: u64,
) -> LogEntry {
    let event = AtomicRequestFulfilled {
        user,
        offerToken: LBTCV.address,
        wantToken: LBTC.address,
        offerAmountSpent: U256::from(offer_spent),
        wantAmountReceived: U256::from(want_received),
        timestamp: U256::from(GENESIS_TIME as u64),
    };
    entry(ATOMIC_QUEUE_ADDRESS, &event, block_number, log_index, tx_hash)
}

/// Runs `log` through the decoder as the scanner would for a monitored wallet.
pub fn resolve(log: &LogEntry) -> ChainEvent {
    let contracts = VaultContracts::from_config(&test_config());
    match decode_log(log, &contracts).expect("test log decodes") {
        Resolved::Event(decoded) => decoded.into_event(log, block_time(log.block_number)),
        Resolved::Skipped(reason) => panic!("test log skipped: {reason:?}"),
    }
}

/// The bus message the publisher would produce for `log`.
pub fn message(log: &LogEntry) -> TransferMessage {
    let row = OutboxEvent {
        event: resolve(log),
        status: OutboxStatus::Processing,
        created_at: block_time(0),
    };
    TransferMessage::from_outbox(&row, Utc::now()).expect("message encodes")
}

#[derive(Default)]
struct ChainState {
    latest: u64,
    logs: Vec<LogEntry>,
    failed_txs: HashSet<B256>,
    unavailable: bool,
    log_queries: Vec<(u64, u64)>,
}

/// Chain whose head and logs are set by the test.
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    pub fn new(latest: u64) -> Self {
        let chain = Self::default();
        chain.set_latest(latest);
        chain
    }

    pub fn set_latest(&self, latest: u64) {
        self.state.lock().unwrap().latest = latest;
    }

    pub fn add_log(&self, log: LogEntry) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub fn fail_transaction(&self, tx_hash: B256) {
        self.state.lock().unwrap().failed_txs.insert(tx_hash);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().log_queries.clone()
    }

    fn check_available(&self) -> Result<(), ClientError> {
        if self.state.lock().unwrap().unavailable {
            return Err(ClientError::Rpc {
                code: -32000,
                message: "node unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn latest_block(&self) -> Result<u64, ClientError> {
        self.check_available()?;
        Ok(self.state.lock().unwrap().latest)
    }

    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        addresses: &[Address],
        topics: &[B256],
    ) -> Result<Vec<LogEntry>, ClientError> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        state.log_queries.push((from_block, to_block));

        Ok(state
            .logs
            .iter()
            .filter(|log| (from_block..=to_block).contains(&log.block_number))
            .filter(|log| addresses.contains(&log.address))
            .filter(|log| log.topics.first().map(|t| topics.contains(t)).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn transaction_succeeded(&self, tx_hash: B256) -> Result<bool, ClientError> {
        self.check_available()?;
        Ok(!self.state.lock().unwrap().failed_txs.contains(&tx_hash))
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<DateTime<Utc>, ClientError> {
        self.check_available()?;
        Ok(block_time(block_number))
    }
}

#[derive(Debug, Clone)]
pub struct StoredOutboxRow {
    pub event: ChainEvent,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct StoreState {
    addresses: HashSet<(String, i64)>,
    address_lookups: usize,
    cursor: u64,
    cursor_conflict: bool,
    outbox: Vec<StoredOutboxRow>,
    outbox_writes_fail: bool,
    outbox_marks_failing: usize,
    orders: Vec<Order>,
    order_writes_failing: usize,
    clock: i64,
}

/// All four stores over one in-memory state, mirroring the Postgres constraints.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn new(cursor: u64) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().cursor = cursor;
        store
    }

    pub fn monitor(&self, wallet: Address) {
        self.state
            .lock()
            .unwrap()
            .addresses
            .insert((wallet.to_checksum(None), 1));
    }

    pub fn address_lookups(&self) -> usize {
        self.state.lock().unwrap().address_lookups
    }

    pub fn cursor(&self) -> u64 {
        self.state.lock().unwrap().cursor
    }

    pub fn set_cursor(&self, cursor: u64) {
        self.state.lock().unwrap().cursor = cursor;
    }

    /// The next advance sees a cursor moved by someone else.
    pub fn simulate_cursor_conflict(&self) {
        self.state.lock().unwrap().cursor_conflict = true;
    }

    pub fn fail_outbox_writes(&self, fail: bool) {
        self.state.lock().unwrap().outbox_writes_fail = fail;
    }

    /// The next `count` mark_sent / mark_failed calls fail.
    pub fn fail_outbox_marks(&self, count: usize) {
        self.state.lock().unwrap().outbox_marks_failing = count;
    }

    pub fn processing_rows(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .outbox
            .iter()
            .filter(|row| row.status == OutboxStatus::Processing)
            .count()
    }

    /// The next `count` order writes fail.
    pub fn fail_order_writes(&self, count: usize) {
        self.state.lock().unwrap().order_writes_failing = count;
    }

    pub fn outbox_rows(&self) -> Vec<StoredOutboxRow> {
        self.state.lock().unwrap().outbox.clone()
    }

    pub fn outbox_status(&self, tx_hash: &str, log_index: u64) -> Option<OutboxStatus> {
        self.state
            .lock()
            .unwrap()
            .outbox
            .iter()
            .find(|row| row.event.tx_hash == tx_hash && row.event.log_index == log_index)
            .map(|row| row.status)
    }

    /// Puts a row in `processing` as if claimed `age` ago by a publisher that died.
    pub fn force_processing(&self, tx_hash: &str, log_index: u64, age: Duration) {
        let mut state = self.state.lock().unwrap();
        let claimed_at = Utc::now() - chrono::Duration::from_std(age).unwrap();
        if let Some(row) = state
            .outbox
            .iter_mut()
            .find(|row| row.event.tx_hash == tx_hash && row.event.log_index == log_index)
        {
            row.status = OutboxStatus::Processing;
            row.claimed_at = Some(claimed_at);
        }
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn in_progress_withdrawals(&self, wallet_address: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .orders
            .iter()
            .filter(|o| {
                o.wallet_address == wallet_address
                    && o.transfer_type == TransferType::Withdrawal
                    && o.status == OrderStatus::InProgress
            })
            .count()
    }

    fn check_order_write(state: &mut StoreState) -> Result<(), StoreError> {
        if state.order_writes_failing > 0 {
            state.order_writes_failing -= 1;
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    // mirrors idx_orders_one_in_progress_withdrawal
    fn check_single_in_progress(orders: &[Order]) -> Result<(), StoreError> {
        let mut open = HashSet::new();
        for order in orders {
            if order.transfer_type == TransferType::Withdrawal
                && order.status == OrderStatus::InProgress
                && !open.insert(order.wallet_address.clone())
            {
                return Err(StoreError::Corrupt(format!(
                    "second in-progress withdrawal for {}",
                    order.wallet_address
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AddressStore for FakeStore {
    async fn register_address(&self, wallet_address: &str, chain_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .addresses
            .insert((wallet_address.to_string(), chain_id)))
    }

    async fn is_monitored(&self, wallet_address: &str, chain_id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.address_lookups += 1;
        Ok(state.addresses.contains(&(wallet_address.to_string(), chain_id)))
    }
}

#[async_trait]
impl CursorStore for FakeStore {
    async fn last_processed_block(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().unwrap().cursor)
    }

    async fn advance_cursor(&self, from: u64, to: u64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.cursor_conflict {
            state.cursor_conflict = false;
            state.cursor = from + 1;
        }
        if state.cursor != from || to <= from {
            return Ok(false);
        }
        state.cursor = to;
        Ok(true)
    }
}

#[async_trait]
impl OutboxStore for FakeStore {
    async fn upsert_event(&self, event: &ChainEvent) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.outbox_writes_fail {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        if let Some(row) = state
            .outbox
            .iter_mut()
            .find(|row| row.event.tx_hash == event.tx_hash && row.event.log_index == event.log_index)
        {
            row.event = event.clone();
            return Ok(());
        }

        state.clock += 1;
        let created_at = block_time(0) + chrono::Duration::milliseconds(state.clock);
        state.outbox.push(StoredOutboxRow {
            event: event.clone(),
            status: OutboxStatus::Unsent,
            created_at,
            claimed_at: None,
        });
        Ok(())
    }

    async fn claim_unsent(&self, limit: i64) -> Result<Vec<OutboxEvent>, StoreError> {
        let mut state = self.state.lock().unwrap();
        let in_flight: HashSet<String> = state
            .outbox
            .iter()
            .filter(|row| row.status == OutboxStatus::Processing)
            .map(|row| row.event.wallet_address.clone())
            .collect();
        let mut unsent: Vec<usize> = state
            .outbox
            .iter()
            .enumerate()
            .filter(|(_, row)| row.status == OutboxStatus::Unsent)
            .filter(|(_, row)| !in_flight.contains(&row.event.wallet_address))
            .map(|(i, _)| i)
            .collect();
        unsent.sort_by_key(|&i| {
            let row = &state.outbox[i];
            (row.created_at, row.event.block_number, row.event.log_index)
        });

        let now = Utc::now();
        let mut claimed = Vec::new();
        for i in unsent.into_iter().take(limit.max(0) as usize) {
            let row = &mut state.outbox[i];
            row.status = OutboxStatus::Processing;
            row.claimed_at = Some(now);
            claimed.push(OutboxEvent {
                event: row.event.clone(),
                status: row.status,
                created_at: row.created_at,
            });
        }
        Ok(claimed)
    }

    async fn mark_sent(&self, tx_hash: &str, event_type: EventType, log_index: u64) -> Result<(), StoreError> {
        self.release(tx_hash, event_type, log_index, OutboxStatus::Sent)
    }

    async fn mark_failed(&self, tx_hash: &str, event_type: EventType, log_index: u64) -> Result<(), StoreError> {
        self.release(tx_hash, event_type, log_index, OutboxStatus::Unsent)
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, StoreError> {
        let threshold = Utc::now() - chrono::Duration::from_std(older_than).unwrap();
        let mut state = self.state.lock().unwrap();
        let mut reclaimed = 0;
        for row in state.outbox.iter_mut() {
            if row.status == OutboxStatus::Processing && row.claimed_at.map(|at| at < threshold).unwrap_or(false) {
                row.status = OutboxStatus::Unsent;
                row.claimed_at = None;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}

impl FakeStore {
    fn release(
        &self,
        tx_hash: &str,
        event_type: EventType,
        log_index: u64,
        status: OutboxStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.outbox_marks_failing > 0 {
            state.outbox_marks_failing -= 1;
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        if let Some(row) = state.outbox.iter_mut().find(|row| {
            row.event.tx_hash == tx_hash
                && row.event.log_index == log_index
                && row.event.event_type() == event_type
                && row.status == OutboxStatus::Processing
        }) {
            row.status = status;
            row.claimed_at = None;
        }
        Ok(())
    }

    fn latest_open_withdrawal<'a>(
        orders: impl Iterator<Item = &'a Order>,
        wallet_address: &str,
    ) -> Option<Order> {
        orders
            .filter(|o| {
                o.wallet_address == wallet_address
                    && o.transfer_type == TransferType::Withdrawal
                    && o.status == OrderStatus::InProgress
            })
            .max_by_key(|o| (o.tx_date, o.block_number, o.log_index))
            .cloned()
    }
}

#[async_trait]
impl OrderStore for FakeStore {
    async fn upsert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        Self::check_order_write(&mut state)?;

        let mut orders = state.orders.clone();
        match orders
            .iter_mut()
            .find(|o| o.tx_hash == order.tx_hash && o.log_index == order.log_index)
        {
            Some(existing) => {
                let order_id = existing.order_id;
                *existing = order.clone();
                existing.order_id = order_id;
            }
            None => orders.push(order.clone()),
        }

        Self::check_single_in_progress(&orders)?;
        state.orders = orders;
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        Self::check_order_write(&mut state)?;

        let mut orders = state.orders.clone();
        if let Some(existing) = orders.iter_mut().find(|o| o.order_id == order.order_id) {
            *existing = order.clone();
        }

        Self::check_single_in_progress(&orders)?;
        state.orders = orders;
        Ok(())
    }

    async fn find_by_key(&self, tx_hash: &str, log_index: u64) -> Result<Option<Order>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| o.tx_hash == tx_hash && o.log_index == log_index)
            .cloned())
    }

    async fn find_by_completion(&self, tx_hash: &str, log_index: u64) -> Result<Option<Order>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| {
                o.completion_tx_hash.as_deref() == Some(tx_hash) && o.completion_log_index == Some(log_index)
            })
            .cloned())
    }

    async fn last_in_progress_withdrawal(&self, wallet_address: &str) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(Self::latest_open_withdrawal(state.orders.iter(), wallet_address))
    }

    async fn in_progress_withdrawal_with_amount(
        &self,
        wallet_address: &str,
        amount: &str,
    ) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(Self::latest_open_withdrawal(
            state.orders.iter().filter(|o| o.amount == amount),
            wallet_address,
        ))
    }

    async fn order_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .orders
            .iter()
            .find(|o| o.tx_hash == tx_hash)
            .or_else(|| {
                state
                    .orders
                    .iter()
                    .find(|o| o.completion_tx_hash.as_deref() == Some(tx_hash))
            })
            .cloned())
    }
}

#[derive(Default)]
struct BusState {
    log: Vec<Delivery>,
    position: usize,
    committed: i64,
    failing_keys: HashSet<String>,
    rewinds: usize,
}

/// Single-partition bus: one ordered log, which keeps every key's order trivially.
/// `next` reports `Closed` once the log is drained.
#[derive(Default)]
pub struct FakeBus {
    state: Mutex<BusState>,
}

impl FakeBus {
    pub fn fail_key(&self, key: &str) {
        self.state.lock().unwrap().failing_keys.insert(key.to_string());
    }

    pub fn restore_key(&self, key: &str) {
        self.state.lock().unwrap().failing_keys.remove(key);
    }

    pub fn messages(&self) -> Vec<Delivery> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn push_raw(&self, key: &str, payload: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        let offset = state.log.len() as i64;
        state.log.push(Delivery {
            partition: 0,
            offset,
            key: Some(key.to_string()),
            payload,
        });
    }

    pub fn committed(&self) -> i64 {
        self.state.lock().unwrap().committed
    }

    pub fn rewinds(&self) -> usize {
        self.state.lock().unwrap().rewinds
    }

    pub fn keys_by_offset(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|delivery| delivery.key)
            .collect()
    }
}

#[async_trait]
impl BusProducer for FakeBus {
    async fn send(&self, key: &str, payload: &[u8]) -> Result<(), BusError> {
        if self.state.lock().unwrap().failing_keys.contains(key) {
            return Err(BusError::Timeout(Duration::from_secs(1)));
        }
        self.push_raw(key, payload.to_vec());
        Ok(())
    }
}

#[async_trait]
impl BusConsumer for FakeBus {
    async fn next(&self) -> Result<Delivery, BusError> {
        let mut state = self.state.lock().unwrap();
        let Some(delivery) = state.log.get(state.position).cloned() else {
            return Err(BusError::Closed);
        };
        state.position += 1;
        Ok(delivery)
    }

    async fn commit(&self, delivery: &Delivery) -> Result<(), BusError> {
        self.state.lock().unwrap().committed = delivery.offset + 1;
        Ok(())
    }

    async fn rewind(&self, delivery: &Delivery) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();
        state.position = delivery.offset as usize;
        state.rewinds += 1;
        Ok(())
    }
}

pub fn order_map(orders: &[Order]) -> HashMap<String, Order> {
    orders
        .iter()
        .map(|order| (format!("{}:{}", order.tx_hash, order.log_index), order.clone()))
        .collect()
}
