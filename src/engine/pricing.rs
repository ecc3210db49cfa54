//! Mark price operations.

use super::core::Engine;
use super::results::EngineError;
use crate::history::HistoryLog;
use crate::mark_price::MarkPrice;
use crate::store::StateStore;
use crate::types::{Price, Symbol, Timestamp};
use rust_decimal::Decimal;

impl<S: StateStore, H: HistoryLog> Engine<S, H> {
    /// Replace the mark price for a symbol.
    ///
    /// A single-key write with no per-account work: equity is never cached, so
    /// the next read of any account holding the symbol sees the new price.
    pub fn update_mark_price(&self, symbol: &Symbol, price: Decimal) -> Result<(), EngineError> {
        let price = Price::new(price).ok_or(EngineError::InvalidPrice(price))?;

        self.store
            .set_mark_price(symbol.clone(), MarkPrice::new(price, Timestamp::now()))?;

        tracing::info!(%symbol, %price, "mark price updated");
        Ok(())
    }

    pub fn mark_price(&self, symbol: &Symbol) -> Result<MarkPrice, EngineError> {
        self.store
            .mark_price(symbol)?
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.clone()))
    }
}
