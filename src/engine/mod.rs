// 8.0: core margin engine. books trades under a per-account lock, applies mark prices,
// scans for liquidations and builds margin reports. state lives in the store, records
// go to the history log.

mod core;
mod liquidations;
mod positions;
mod pricing;
mod results;
mod trades;

pub use self::core::Engine;
pub use liquidations::liquidation_reason;
pub use results::{
    AccountMarginStatus, AccountPositions, EngineError, LiquidationCandidate, LiquidationScan, MarginReport,
    PositionView, SkippedAccount, TradeResult,
};
