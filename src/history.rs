// 11.0: immutable history. every booked trade and every detected breach produces one record.
// the engine only appends; reading history back is the collaborator's business, so the
// queries live on the in-memory adapter and never on the engine.

use crate::types::{AccountId, Price, Quote, Side, Symbol, Timestamp};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Price,
    pub notional: Quote,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    pub account_id: AccountId,
    pub equity: Quote,
    pub maintenance_margin: Quote,
    pub reason: String,
    pub timestamp: Timestamp,
}

/// A record as the log stored it, with the id the log assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logged<T> {
    pub id: RecordId,
    pub record: T,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("History log unavailable: {0}")]
    Unavailable(String),
}

pub trait HistoryLog: Send + Sync {
    fn append_trade(&self, record: TradeRecord) -> Result<RecordId, HistoryError>;

    fn append_liquidation(&self, record: LiquidationRecord) -> Result<RecordId, HistoryError>;
}

#[derive(Debug, Default)]
struct HistoryInner {
    trades: Vec<Logged<TradeRecord>>,
    liquidations: Vec<Logged<LiquidationRecord>>,
    next_id: u64,
}

impl HistoryInner {
    fn next_id(&mut self) -> RecordId {
        self.next_id += 1;
        RecordId(self.next_id)
    }
}

/// Append-only log kept in memory. Ids are sequential across both record kinds.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    inner: Mutex<HistoryInner>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trades for one account, newest first.
    pub fn trades(&self, account_id: AccountId, limit: usize) -> Vec<Logged<TradeRecord>> {
        let inner = self.inner.lock();
        inner
            .trades
            .iter()
            .rev()
            .filter(|logged| logged.record.account_id == account_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Liquidations, optionally for one account, newest first.
    pub fn liquidations(&self, account_id: Option<AccountId>, limit: usize) -> Vec<Logged<LiquidationRecord>> {
        let inner = self.inner.lock();
        inner
            .liquidations
            .iter()
            .rev()
            .filter(|logged| account_id.map_or(true, |id| logged.record.account_id == id))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn trade_count(&self) -> usize {
        self.inner.lock().trades.len()
    }

    pub fn liquidation_count(&self) -> usize {
        self.inner.lock().liquidations.len()
    }
}

impl HistoryLog for InMemoryHistory {
    fn append_trade(&self, record: TradeRecord) -> Result<RecordId, HistoryError> {
        let mut inner = self.inner.lock();
        let id = inner.next_id();
        inner.trades.push(Logged { id, record });
        Ok(id)
    }

    fn append_liquidation(&self, record: LiquidationRecord) -> Result<RecordId, HistoryError> {
        let mut inner = self.inner.lock();
        let id = inner.next_id();
        inner.liquidations.push(Logged { id, record });
        Ok(id)
    }
}
