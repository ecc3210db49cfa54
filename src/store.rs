//! State store boundary.
//!
//! The store is the sole owner of current account and mark-price state. The
//! engine holds no account copies across requests: it loads a snapshot, derives
//! the next state and commits it whole. `commit_account` must be atomic for one
//! account and `set_mark_price` atomic for one symbol; nothing stronger is
//! required of an adapter.

use crate::account::AccountState;
use crate::mark_price::MarkPrice;
use crate::types::{AccountId, Symbol};
use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("State store unavailable: {0}")]
    Unavailable(String),
}

pub trait StateStore: Send + Sync {
    /// `Ok(None)` for an account with no prior state.
    fn load_account(&self, id: AccountId) -> Result<Option<AccountState>, StoreError>;

    /// Replaces balance and positions of one account in a single write.
    fn commit_account(&self, state: AccountState) -> Result<(), StoreError>;

    fn mark_price(&self, symbol: &Symbol) -> Result<Option<MarkPrice>, StoreError>;

    fn set_mark_price(&self, symbol: Symbol, mark: MarkPrice) -> Result<(), StoreError>;

    fn account_ids(&self) -> Result<Vec<AccountId>, StoreError>;
}

/// In-process adapter. Sharded maps, so writes to different accounts do not contend.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    accounts: DashMap<AccountId, AccountState>,
    mark_prices: DashMap<Symbol, MarkPrice>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

impl StateStore for InMemoryStore {
    fn load_account(&self, id: AccountId) -> Result<Option<AccountState>, StoreError> {
        Ok(self.accounts.get(&id).map(|entry| entry.value().clone()))
    }

    fn commit_account(&self, state: AccountState) -> Result<(), StoreError> {
        self.accounts.insert(state.id, state);
        Ok(())
    }

    fn mark_price(&self, symbol: &Symbol) -> Result<Option<MarkPrice>, StoreError> {
        Ok(self.mark_prices.get(symbol).map(|entry| *entry.value()))
    }

    fn set_mark_price(&self, symbol: Symbol, mark: MarkPrice) -> Result<(), StoreError> {
        self.mark_prices.insert(symbol, mark);
        Ok(())
    }

    fn account_ids(&self) -> Result<Vec<AccountId>, StoreError> {
        let mut ids: Vec<AccountId> = self.accounts.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Price, Quote, Timestamp};
    use rust_decimal_macros::dec;

    #[test]
    fn unknown_account_loads_as_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.load_account(AccountId(1)).unwrap(), None);
    }

    #[test]
    fn commit_replaces_whole_account() {
        let store = InMemoryStore::new();
        store
            .commit_account(AccountState::with_balance(AccountId(1), Quote::new(dec!(100))))
            .unwrap();
        store
            .commit_account(AccountState::with_balance(AccountId(1), Quote::new(dec!(250))))
            .unwrap();

        let loaded = store.load_account(AccountId(1)).unwrap().unwrap();
        assert_eq!(loaded.balance.value(), dec!(250));
        assert_eq!(store.account_count(), 1);
    }

    #[test]
    fn account_ids_are_sorted() {
        let store = InMemoryStore::new();
        for id in [3, 1, 2] {
            store.commit_account(AccountState::new(AccountId(id))).unwrap();
        }
        assert_eq!(
            store.account_ids().unwrap(),
            vec![AccountId(1), AccountId(2), AccountId(3)]
        );
    }

    #[test]
    fn mark_price_round_trip() {
        let store = InMemoryStore::new();
        let btc = Symbol::from("BTC-PERP");
        assert!(store.mark_price(&btc).unwrap().is_none());

        let mark = MarkPrice::new(Price::new_unchecked(dec!(50000)), Timestamp::from_millis(5));
        store.set_mark_price(btc.clone(), mark).unwrap();
        assert_eq!(store.mark_price(&btc).unwrap(), Some(mark));
    }
}
