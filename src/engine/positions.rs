//! Position queries.

use super::core::Engine;
use super::results::{AccountPositions, EngineError, PositionView};
use crate::history::HistoryLog;
use crate::margin::{account_equity, total_unrealized_pnl, MarginError};
use crate::store::StateStore;
use crate::types::AccountId;

impl<S: StateStore, H: HistoryLog> Engine<S, H> {
    /// Balance, equity and every open position with its pnl, from one price snapshot.
    pub fn get_positions(&self, account_id: AccountId) -> Result<AccountPositions, EngineError> {
        let account = self
            .store
            .load_account(account_id)?
            .ok_or(EngineError::AccountNotFound(account_id))?;

        let prices = self.price_snapshot(&account, None)?;

        let mut positions = Vec::new();
        for position in account.open_positions() {
            let mark_price = prices
                .get(&position.symbol)
                .ok_or_else(|| MarginError::MissingMarkPrice(position.symbol.clone()))?;

            let unrealized_pnl = position.unrealized_pnl(mark_price).ok_or(MarginError::Overflow)?;
            let notional = position.notional_value(mark_price).ok_or(MarginError::Overflow)?;

            positions.push(PositionView {
                symbol: position.symbol.clone(),
                quantity: position.size.value(),
                avg_price: position.entry_price,
                mark_price,
                unrealized_pnl,
                notional,
            });
        }

        let equity = account_equity(&account, &prices)?;
        let unrealized_pnl = total_unrealized_pnl(account.positions.values(), &prices)?;

        Ok(AccountPositions {
            account_id,
            balance: account.balance,
            equity,
            unrealized_pnl,
            positions,
        })
    }
}
