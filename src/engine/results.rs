// 8.0.2: result types and errors for engine operations.

use crate::history::{RecordId, TradeRecord};
use crate::margin::{MarginError, MarginStatus};
use crate::position::{FillKind, Position};
use crate::store::StoreError;
use crate::types::{AccountId, Price, Quote, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TradeResult {
    pub trade: TradeRecord,
    // None when the history append failed after the state was committed
    pub trade_id: Option<RecordId>,
    pub fill_kind: FillKind,
    pub position: Option<Position>,
    pub realized_pnl: Quote,
    pub balance: Quote,
    pub equity: Quote,
    pub required_initial_margin: Quote,
}

impl TradeResult {
    pub fn notional(&self) -> Quote {
        self.trade.notional
    }

    pub fn history_recorded(&self) -> bool {
        self.trade_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionView {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub avg_price: Price,
    pub mark_price: Price,
    pub unrealized_pnl: Quote,
    pub notional: Quote,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountPositions {
    pub account_id: AccountId,
    pub balance: Quote,
    pub equity: Quote,
    pub unrealized_pnl: Quote,
    pub positions: Vec<PositionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidationCandidate {
    pub account_id: AccountId,
    pub equity: Quote,
    pub maintenance_margin: Quote,
    pub shortfall: Quote,
    pub reason: String,
    // None when the liquidation record could not be appended
    pub record_id: Option<RecordId>,
}

impl LiquidationCandidate {
    pub fn recorded(&self) -> bool {
        self.record_id.is_some()
    }
}

/// An account the scan or report could not evaluate. Other accounts are unaffected.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedAccount {
    pub account_id: AccountId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LiquidationScan {
    pub candidates: Vec<LiquidationCandidate>,
    pub skipped: Vec<SkippedAccount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountMarginStatus {
    pub account_id: AccountId,
    pub equity: Quote,
    pub used_margin: Quote,
    pub maintenance_margin: Quote,
    pub free_margin: Quote,
    pub margin_utilisation_pct: Decimal,
    pub status: MarginStatus,
    pub is_liquidation_candidate: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MarginReport {
    pub total_accounts: usize,
    pub accounts: Vec<AccountMarginStatus>,
    pub liquidation_candidates: Vec<AccountId>,
    pub skipped: Vec<SkippedAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Insufficient margin: equity {equity}, required {required}, shortfall {shortfall}")]
    InsufficientMargin {
        equity: Quote,
        required: Quote,
        shortfall: Quote,
    },

    #[error("Invalid quantity {0}: must be positive and keep trade figures in range")]
    InvalidQuantity(Decimal),

    #[error("Invalid price {0}: must be positive and keep trade figures in range")]
    InvalidPrice(Decimal),

    #[error("Invalid amount {0}: must be positive and keep the balance in range")]
    InvalidAmount(Decimal),

    #[error("No mark price registered for {0}")]
    UnknownSymbol(Symbol),

    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("Account {0} is busy: lock not acquired in time")]
    AccountBusy(AccountId),

    // an account whose figures at the current mark do not fit in a Decimal
    #[error("Margin figures exceed the decimal range")]
    ArithmeticOverflow,

    #[error("State store unavailable: {0}")]
    StateStoreUnavailable(#[from] StoreError),
}

impl From<MarginError> for EngineError {
    fn from(err: MarginError) -> Self {
        match err {
            MarginError::MissingMarkPrice(symbol) => EngineError::UnknownSymbol(symbol),
            MarginError::Overflow => EngineError::ArithmeticOverflow,
        }
    }
}
