// margin-core: single-instrument margin engine.
// pre-trade initial margin gate, on-demand equity, maintenance margin scan.
// all money math is exact decimal. storage and history sit behind traits.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, Symbol, Side, Price, Quote, Timestamp
//   3.x  margin.rs: equity, IM/MM, free margin, margin status
//   4.x  position.rs: position struct, PnL, open/increase/reduce/close/flip
//   7.x  config.rs: margin rates, lock timeout, env overrides
//   8.x  engine/: trades, mark prices, positions, liquidation scan, margin report
//   10.x account.rs: cash balance + positions per account
//   11.x history.rs: trade and liquidation records, history log boundary
//   12.x store.rs: state store boundary + in-memory adapter
//   13.x mark_price.rs: stored mark price + per-evaluation snapshot

pub mod account;
pub mod config;
pub mod engine;
pub mod history;
pub mod margin;
pub mod mark_price;
pub mod position;
pub mod store;
pub mod types;

// re exports for convenience
pub use account::*;
pub use config::{ConfigError, EngineConfig};
pub use engine::*;
pub use history::*;
pub use margin::*;
pub use mark_price::*;
pub use position::*;
pub use store::*;
pub use types::*;
