//! Trade booking: check and commit as one unit per account.

use super::core::Engine;
use super::results::{EngineError, TradeResult};
use crate::history::{HistoryLog, TradeRecord};
use crate::margin::{account_equity, evaluate_account, MarginError};
use crate::position::apply_fill;
use crate::store::StateStore;
use crate::types::{AccountId, Price, Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;

impl<S: StateStore, H: HistoryLog> Engine<S, H> {
    /// Books an immediately filled trade.
    ///
    /// The account lock is held from the first read to the commit, so two trades on
    /// one account can never both pass the margin check against the same equity.
    /// Trades that open, grow or flip exposure need `equity >= IM(post-trade positions)`;
    /// a strict reduce or a close is always allowed. Cash moves only by realized pnl.
    /// A rejected trade leaves the store and the history untouched, and so does one
    /// whose figures would not fit in a Decimal.
    pub fn execute_trade(
        &self,
        account_id: AccountId,
        symbol: &Symbol,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<TradeResult, EngineError> {
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidQuantity(quantity));
        }
        let trade_price = Price::new(price).ok_or(EngineError::InvalidPrice(price))?;
        let notional = quantity
            .checked_mul(price)
            .map(Quote::new)
            .ok_or_else(|| out_of_range(quantity, price))?;

        self.with_account_lock(account_id, || {
            self.book_trade(account_id, symbol, side, quantity, trade_price, notional)
        })
    }

    // runs under the account lock. everything that can fail happens before the commit
    fn book_trade(
        &self,
        account_id: AccountId,
        symbol: &Symbol,
        side: Side,
        quantity: Decimal,
        trade_price: Price,
        notional: Quote,
    ) -> Result<TradeResult, EngineError> {
        let account = self.load_or_new(account_id)?;
        let prices = self.price_snapshot(&account, Some(symbol))?;
        if !prices.contains(symbol) {
            return Err(EngineError::UnknownSymbol(symbol.clone()));
        }

        // equity is valued at mark, before the fill
        let equity = account_equity(&account, &prices)?;

        let trade_fault = || out_of_range(quantity, trade_price.value());
        let outcome = apply_fill(account.get_position(symbol), symbol, side, quantity, trade_price)
            .ok_or_else(trade_fault)?;

        let mut next = account.clone();
        match &outcome.position {
            Some(position) => next.set_position(position.clone()),
            None => {
                next.remove_position(symbol);
            }
        }
        let balance = next.credit(outcome.realized_pnl).ok_or_else(trade_fault)?;

        // the committed state must stay evaluable at the current mark
        let post_trade = evaluate_account(&next, &prices, &self.config.margin).map_err(|err| match err {
            MarginError::Overflow => trade_fault(),
            other => other.into(),
        })?;
        let required = post_trade.used_margin;

        if !outcome.kind.is_risk_reducing() && equity < required {
            let shortfall = required.saturating_sub(equity);
            tracing::debug!(
                account_id = %account_id,
                %symbol,
                %side,
                %quantity,
                %equity,
                %required,
                %shortfall,
                "trade rejected: insufficient margin"
            );
            return Err(EngineError::InsufficientMargin {
                equity,
                required,
                shortfall,
            });
        }

        let trade = TradeRecord {
            account_id,
            symbol: symbol.clone(),
            side,
            quantity,
            price: trade_price,
            notional,
            timestamp: Timestamp::now(),
        };
        let position = outcome.position.clone();

        self.store.commit_account(next)?;

        let trade_id = match self.history.append_trade(trade.clone()) {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(account_id = %account_id, %symbol, error = %err, "trade committed but not recorded");
                None
            }
        };

        tracing::info!(
            account_id = %account_id,
            %symbol,
            %side,
            %quantity,
            price = %trade_price,
            kind = ?outcome.kind,
            realized_pnl = %outcome.realized_pnl,
            "trade booked"
        );

        Ok(TradeResult {
            trade,
            trade_id,
            fill_kind: outcome.kind,
            position,
            realized_pnl: outcome.realized_pnl,
            balance,
            equity,
            required_initial_margin: required,
        })
    }
}

// a trade whose figures leave the decimal range. blame the larger of the two inputs
fn out_of_range(quantity: Decimal, price: Decimal) -> EngineError {
    if price >= quantity {
        EngineError::InvalidPrice(price)
    } else {
        EngineError::InvalidQuantity(quantity)
    }
}
