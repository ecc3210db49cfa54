//! Account state: cash balance and open positions.
//!
//! An `AccountState` is a value, not a live handle. The engine loads one from the
//! store, derives a new one for a trade, and commits it back as a whole so the
//! balance and positions of an account always change together.

use crate::position::Position;
use crate::types::{AccountId, Quote, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub id: AccountId,
    pub balance: Quote,
    pub positions: BTreeMap<Symbol, Position>,
}

impl AccountState {
    /// Flat account with zero cash. Used for accounts the store has never seen.
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            balance: Quote::zero(),
            positions: BTreeMap::new(),
        }
    }

    pub fn with_balance(id: AccountId, balance: Quote) -> Self {
        Self {
            balance,
            ..Self::new(id)
        }
    }

    pub fn get_position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    // flat positions are dropped rather than stored as zero records
    pub fn set_position(&mut self, position: Position) {
        if position.is_empty() {
            self.positions.remove(&position.symbol);
        } else {
            self.positions.insert(position.symbol.clone(), position);
        }
    }

    pub fn remove_position(&mut self, symbol: &Symbol) -> Option<Position> {
        self.positions.remove(symbol)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| !p.is_empty())
    }

    pub fn has_open_positions(&self) -> bool {
        self.open_positions().next().is_some()
    }

    pub fn held_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.open_positions().map(|p| &p.symbol)
    }

    /// Adds `amount` (negative for a loss) and returns the new balance. None leaves the
    /// balance untouched: the sum does not fit in a Decimal.
    pub fn credit(&mut self, amount: Quote) -> Option<Quote> {
        self.balance = self.balance.checked_add(amount)?;
        Some(self.balance)
    }
}
