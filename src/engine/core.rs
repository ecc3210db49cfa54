// 8.0 engine/core.rs: the engine handle. owns the lock table, borrows state through the store.

use super::results::EngineError;
use crate::account::AccountState;
use crate::config::EngineConfig;
use crate::history::{HistoryLog, InMemoryHistory};
use crate::margin::{evaluate_account, MarginFigures};
use crate::mark_price::PriceSnapshot;
use crate::store::{InMemoryStore, StateStore};
use crate::types::{AccountId, Quote, Symbol};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use std::sync::Arc;

/** 8.1: main engine struct. holds no account state between requests */
pub struct Engine<S: StateStore = InMemoryStore, H: HistoryLog = InMemoryHistory> {
    pub(super) config: EngineConfig,
    pub(super) store: Arc<S>,
    pub(super) history: Arc<H>,
    // one mutex per account with a request in flight, dropped when the last one leaves
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl Engine {
    /// Engine over fresh in-memory store and history.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryHistory::new()),
        )
    }
}

impl<S: StateStore, H: HistoryLog> Engine<S, H> {
    pub fn with_backends(config: EngineConfig, store: Arc<S>, history: Arc<H>) -> Self {
        Self {
            config,
            store,
            history,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    /// Credits cash to an account, creating it if the store has never seen it.
    pub fn deposit(&self, account_id: AccountId, amount: Decimal) -> Result<Quote, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount(amount));
        }

        self.with_account_lock(account_id, || {
            let mut account = self.load_or_new(account_id)?;
            let balance = account
                .credit(Quote::new(amount))
                .ok_or(EngineError::InvalidAmount(amount))?;
            self.store.commit_account(account)?;

            tracing::info!(account_id = %account_id, %amount, %balance, "deposit credited");
            Ok(balance)
        })
    }

    /// Runs `f` while holding the account's lock. A timeout is `AccountBusy`, terminal
    /// for the request.
    pub(super) fn with_account_lock<T>(
        &self,
        account_id: AccountId,
        f: impl FnOnce() -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let lock = self.account_lock(account_id);
        let result = self.acquire(&lock, account_id).and_then(|_guard| f());
        drop(lock);

        // count 1: only the table holds it, so no request is inside or waiting. clones are
        // taken under the same shard lock, so none can appear while this runs
        self.locks.remove_if(&account_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    fn account_lock(&self, account_id: AccountId) -> Arc<Mutex<()>> {
        // clone the Arc out so the shard lock is released before we block on the account
        self.locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn acquire<'a>(
        &self,
        lock: &'a Mutex<()>,
        account_id: AccountId,
    ) -> Result<MutexGuard<'a, ()>, EngineError> {
        lock.try_lock_for(self.config.lock_timeout()).ok_or_else(|| {
            tracing::warn!(account_id = %account_id, "account lock not acquired");
            EngineError::AccountBusy(account_id)
        })
    }

    pub(super) fn load_or_new(&self, account_id: AccountId) -> Result<AccountState, EngineError> {
        Ok(self
            .store
            .load_account(account_id)?
            .unwrap_or_else(|| AccountState::new(account_id)))
    }

    /// Reads each held symbol's price once, plus `extra` if given. Symbols without
    /// a registered price are left out; the calculator reports them.
    pub(super) fn price_snapshot(
        &self,
        account: &AccountState,
        extra: Option<&Symbol>,
    ) -> Result<PriceSnapshot, EngineError> {
        let mut snapshot = PriceSnapshot::new();
        for symbol in account.held_symbols().cloned().chain(extra.cloned()) {
            if snapshot.contains(&symbol) {
                continue;
            }
            if let Some(mark) = self.store.mark_price(&symbol)? {
                snapshot.insert(symbol, mark.price);
            }
        }
        Ok(snapshot)
    }

    pub(super) fn evaluate(&self, account: &AccountState) -> Result<MarginFigures, EngineError> {
        let snapshot = self.price_snapshot(account, None)?;
        Ok(evaluate_account(account, &snapshot, &self.config.margin)?)
    }
}
