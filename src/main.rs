//! Margin engine simulation.
//!
//! Walks the account lifecycle: opening a position, a mark price drop, a crash
//! that triggers a liquidation scan, and two traders racing on one account.

use margin_core::*;
use rust_decimal_macros::dec;
use std::sync::{Arc, Barrier};
use std::thread;
use tracing_subscriber::EnvFilter;

fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    println!("Margin Engine Simulation");
    println!("Single Instrument, Cross Margin, Immediate Fills\n");

    if let Err(err) = run(config) {
        tracing::error!(error = %err, "simulation failed");
        std::process::exit(1);
    }

    println!("\nAll simulations completed successfully.");
}

fn run(config: EngineConfig) -> Result<(), EngineError> {
    scenario_1_open_position(config.clone())?;
    scenario_2_price_drop(config.clone())?;
    scenario_3_crash_and_scan(config.clone())?;
    scenario_4_concurrent_trades(config)?;
    Ok(())
}

fn btc() -> Symbol {
    Symbol::from("BTC-PERP")
}

/// Open a long on a funded account.
fn scenario_1_open_position(config: EngineConfig) -> Result<(), EngineError> {
    println!("Scenario 1: Opening a Position\n");

    let engine = Engine::new(config);
    let alice = AccountId(1);

    engine.deposit(alice, dec!(10000))?;
    engine.update_mark_price(&btc(), dec!(50000))?;
    println!("  Alice deposits $10,000, mark price $50,000");

    let result = engine.execute_trade(alice, &btc(), Side::Buy, dec!(0.1), dec!(50000))?;
    println!(
        "  BUY 0.1 @ $50,000: notional ${}, IM required ${}, equity ${}",
        result.notional(),
        result.required_initial_margin,
        result.equity
    );

    let view = engine.get_positions(alice)?;
    for position in &view.positions {
        println!("  Position: {} {} @ ${}", position.quantity, position.symbol, position.avg_price);
    }
    println!("  Balance ${}, equity ${}\n", view.balance, view.equity);
    Ok(())
}

/// Mark price drop reflected in equity without any per-account work.
fn scenario_2_price_drop(config: EngineConfig) -> Result<(), EngineError> {
    println!("Scenario 2: Mark Price Drop\n");

    let engine = Engine::new(config);
    let alice = AccountId(1);
    engine.deposit(alice, dec!(10000))?;
    engine.update_mark_price(&btc(), dec!(50000))?;
    engine.execute_trade(alice, &btc(), Side::Buy, dec!(0.1), dec!(50000))?;

    engine.update_mark_price(&btc(), dec!(30000))?;
    let report = engine.margin_report()?;
    for status in &report.accounts {
        println!(
            "  Account {}: equity ${}, MM ${}, status {:?}",
            status.account_id, status.equity, status.maintenance_margin, status.status
        );
    }
    println!();
    Ok(())
}

/// A leveraged long through a crash. The scan flags and records it.
fn scenario_3_crash_and_scan(config: EngineConfig) -> Result<(), EngineError> {
    println!("Scenario 3: Crash and Liquidation Scan\n");

    let engine = Engine::new(config);
    let bob = AccountId(2);
    let carol = AccountId(3);
    engine.deposit(bob, dec!(10000))?;
    engine.deposit(carol, dec!(5000))?;
    engine.update_mark_price(&btc(), dec!(50000))?;

    engine.execute_trade(bob, &btc(), Side::Buy, dec!(1), dec!(50000))?;
    println!("  Bob buys 1 BTC at 5x, Carol stays flat");

    engine.update_mark_price(&btc(), dec!(1000))?;
    println!("  Mark price crashes to $1,000");

    let scan = engine.scan_for_liquidations()?;
    for candidate in &scan.candidates {
        println!("  Flagged account {}: {}", candidate.account_id, candidate.reason);
    }

    let records = engine.history().liquidations(None, 10);
    println!("  Liquidation records in history: {}\n", records.len());
    Ok(())
}

/// Two trades on one account, each fine alone, too much together.
fn scenario_4_concurrent_trades(config: EngineConfig) -> Result<(), EngineError> {
    println!("Scenario 4: Concurrent Trades on One Account\n");

    let engine = Arc::new(Engine::new(config));
    let dave = AccountId(4);
    engine.deposit(dave, dec!(10000))?;
    engine.update_mark_price(&btc(), dec!(50000))?;

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.execute_trade(dave, &btc(), Side::Buy, dec!(0.6), dec!(50000))
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(Ok(result)) => println!("  Accepted: {} BTC, notional ${}", result.trade.quantity, result.notional()),
            Ok(Err(err)) => println!("  Rejected: {}", err),
            Err(_) => println!("  Trader thread panicked"),
        }
    }

    let view = engine.get_positions(dave)?;
    println!("  Final position: {} BTC", view.positions.iter().map(|p| p.quantity).sum::<rust_decimal::Decimal>());
    Ok(())
}
