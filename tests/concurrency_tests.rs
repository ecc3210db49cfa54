//! Concurrency tests.
//!
//! Trades on one account are serialized; trades on different accounts run in
//! parallel; a lock that cannot be taken in time surfaces as `AccountBusy`.

use margin_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn btc() -> Symbol {
    Symbol::from("BTC-PERP")
}

#[test]
fn racing_trades_on_one_account_only_one_passes() {
    for _ in 0..50 {
        let engine = Arc::new(Engine::new(EngineConfig::default()));
        engine.deposit(AccountId(1), dec!(10000)).unwrap();
        engine.update_mark_price(&btc(), dec!(50000)).unwrap();

        // each needs 6000 of IM alone, together 12000 against equity 10000
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    engine.execute_trade(AccountId(1), &btc(), Side::Buy, dec!(0.6), dec!(50000))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1);

        let rejected = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(rejected, EngineError::InsufficientMargin { .. }));

        let view = engine.get_positions(AccountId(1)).unwrap();
        assert_eq!(view.positions[0].quantity, dec!(0.6));
        assert_eq!(engine.history().trade_count(), 1);
    }
}

#[test]
fn many_small_trades_never_overshoot_margin() {
    let engine = Arc::new(Engine::new(EngineConfig::default()));
    engine.deposit(AccountId(1), dec!(10000)).unwrap();
    engine.update_mark_price(&btc(), dec!(50000)).unwrap();

    // 0.1 BTC needs 1000 of IM, so at most 10 of 16 can pass
    let barrier = Arc::new(Barrier::new(16));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.execute_trade(AccountId(1), &btc(), Side::Buy, dec!(0.1), dec!(50000))
            })
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(accepted, 10);

    let view = engine.get_positions(AccountId(1)).unwrap();
    assert_eq!(view.positions[0].quantity, dec!(1.0));
}

#[test]
fn distinct_accounts_trade_in_parallel() {
    let engine = Arc::new(Engine::new(EngineConfig::default()));
    engine.update_mark_price(&btc(), dec!(50000)).unwrap();
    for id in 1..=8 {
        engine.deposit(AccountId(id), dec!(10000)).unwrap();
    }

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (1..=8)
        .map(|id| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.execute_trade(AccountId(id), &btc(), Side::Buy, dec!(0.6), dec!(50000))
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_ok());
    }
    assert_eq!(engine.history().trade_count(), 8);
}

#[test]
fn price_updates_interleaved_with_trades() {
    let engine = Arc::new(Engine::new(EngineConfig::default()));
    engine.update_mark_price(&btc(), dec!(50000)).unwrap();
    engine.deposit(AccountId(1), dec!(100000)).unwrap();

    let trader = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 0..100 {
                let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                let _ = engine.execute_trade(AccountId(1), &btc(), side, dec!(0.05), dec!(50000));
            }
        })
    };

    let feed = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 0..100i64 {
                let price = Decimal::from(45_000 + (i * 97) % 10_000);
                engine.update_mark_price(&btc(), price).unwrap();
            }
        })
    };

    trader.join().unwrap();
    feed.join().unwrap();

    // once both are done the account must be consistent with the last mark
    let account = engine.store().load_account(AccountId(1)).unwrap().unwrap();
    let mark = engine.mark_price(&btc()).unwrap().price;
    let expected: Decimal = account.balance.value()
        + account
            .positions
            .values()
            .map(|p| p.size.value() * (mark.value() - p.entry_price.value()))
            .sum::<Decimal>();

    let view = engine.get_positions(AccountId(1)).unwrap();
    assert_eq!(view.equity.value(), expected);
    assert_eq!(engine.history().trade_count(), 100);
}

#[test]
fn scan_runs_alongside_trading() {
    let engine = Arc::new(Engine::new(EngineConfig::default()));
    engine.update_mark_price(&btc(), dec!(50000)).unwrap();
    for id in 1..=4 {
        engine.deposit(AccountId(id), dec!(10000)).unwrap();
    }

    let traders: Vec<_> = (1..=4)
        .map(|id| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..10 {
                    let _ = engine.execute_trade(AccountId(id), &btc(), Side::Buy, dec!(0.01), dec!(50000));
                }
            })
        })
        .collect();

    for _ in 0..10 {
        let scan = engine.scan_for_liquidations().unwrap();
        assert!(scan.candidates.is_empty());
        assert!(scan.skipped.is_empty());
    }

    for handle in traders {
        handle.join().unwrap();
    }
    assert_eq!(engine.margin_report().unwrap().total_accounts, 4);
}

/// Store whose account reads stall, to hold the account lock past another caller's timeout.
struct SlowStore {
    inner: InMemoryStore,
    delay: Duration,
}

impl StateStore for SlowStore {
    fn load_account(&self, id: AccountId) -> Result<Option<AccountState>, StoreError> {
        thread::sleep(self.delay);
        self.inner.load_account(id)
    }

    fn commit_account(&self, state: AccountState) -> Result<(), StoreError> {
        self.inner.commit_account(state)
    }

    fn mark_price(&self, symbol: &Symbol) -> Result<Option<MarkPrice>, StoreError> {
        self.inner.mark_price(symbol)
    }

    fn set_mark_price(&self, symbol: Symbol, mark: MarkPrice) -> Result<(), StoreError> {
        self.inner.set_mark_price(symbol, mark)
    }

    fn account_ids(&self) -> Result<Vec<AccountId>, StoreError> {
        self.inner.account_ids()
    }
}

#[test]
fn lock_timeout_reports_busy() {
    let config = EngineConfig {
        lock_timeout_ms: 10,
        ..EngineConfig::default()
    };
    let store = Arc::new(SlowStore {
        inner: InMemoryStore::new(),
        delay: Duration::from_millis(300),
    });
    let engine = Arc::new(Engine::with_backends(config, store, Arc::new(InMemoryHistory::new())));
    engine.update_mark_price(&btc(), dec!(50000)).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.deposit(AccountId(1), dec!(1000))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(EngineError::AccountBusy(id)) if *id == AccountId(1))));
}
