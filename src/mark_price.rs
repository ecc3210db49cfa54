// 13.0: mark prices. the stored value per symbol plus the per-evaluation snapshot.
// every equity / margin figure computed in one request reads from one PriceSnapshot, so
// two figures for the same account can never straddle a price tick.

use crate::types::{Price, Symbol, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPrice {
    pub price: Price,
    pub updated_at: Timestamp,
}

impl MarkPrice {
    pub fn new(price: Price, updated_at: Timestamp) -> Self {
        Self { price, updated_at }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    prices: HashMap<Symbol, Price>,
}

impl PriceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Symbol, price: Price) {
        self.prices.insert(symbol, price);
    }

    pub fn get(&self, symbol: &Symbol) -> Option<Price> {
        self.prices.get(symbol).copied()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.prices.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(Symbol, Price)> for PriceSnapshot {
    fn from_iter<I: IntoIterator<Item = (Symbol, Price)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_lookup() {
        let snapshot: PriceSnapshot = [(Symbol::from("BTC-PERP"), Price::new_unchecked(dec!(50000)))]
            .into_iter()
            .collect();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&Symbol::from("BTC-PERP")).unwrap().value(), dec!(50000));
        assert!(snapshot.get(&Symbol::from("ETH-PERP")).is_none());
    }
}
