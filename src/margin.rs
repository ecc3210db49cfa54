//! Margin calculation for initial and maintenance requirements.
//!
//! Everything here is a pure function of an account snapshot and a price
//! snapshot. Initial margin (IM) is a flat fraction of notional and gates
//! trades that open or grow exposure. Maintenance margin (MM) is a smaller
//! fraction and decides liquidation flagging. Notional is always valued at the
//! mark price, never at a trade price.

use crate::account::AccountState;
use crate::mark_price::PriceSnapshot;
use crate::position::Position;
use crate::types::{Price, Quote, SignedSize, Symbol};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginParams {
    pub initial_margin_rate: Decimal,
    pub maintenance_margin_rate: Decimal,
}

impl Default for MarginParams {
    fn default() -> Self {
        Self {
            initial_margin_rate: dec!(0.20),
            maintenance_margin_rate: dec!(0.10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarginError {
    #[error("No mark price available for held symbol {0}")]
    MissingMarkPrice(Symbol),

    #[error("Margin figures exceed the decimal range")]
    Overflow,
}

/// All figures for one account, derived from a single price snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginFigures {
    pub balance: Quote,
    pub unrealized_pnl: Quote,
    pub equity: Quote,
    pub total_notional: Quote,
    pub used_margin: Quote,
    pub maintenance_margin: Quote,
    pub free_margin: Quote,
}

impl MarginFigures {
    pub fn is_liquidation_candidate(&self) -> bool {
        is_liquidation_candidate(self.equity, self.maintenance_margin)
    }

    pub fn status(&self) -> MarginStatus {
        evaluate_margin_status(self.equity, self.used_margin, self.maintenance_margin)
    }

    pub fn utilisation_pct(&self) -> Decimal {
        margin_utilisation(self.equity, self.maintenance_margin)
    }
}

pub fn notional_value(size: SignedSize, price: Price) -> Result<Quote, MarginError> {
    size.abs()
        .checked_mul(price.value())
        .map(Quote::new)
        .ok_or(MarginError::Overflow)
}

fn mark_for(position: &Position, prices: &PriceSnapshot) -> Result<Price, MarginError> {
    prices
        .get(&position.symbol)
        .ok_or_else(|| MarginError::MissingMarkPrice(position.symbol.clone()))
}

pub fn total_unrealized_pnl<'a>(
    positions: impl IntoIterator<Item = &'a Position>,
    prices: &PriceSnapshot,
) -> Result<Quote, MarginError> {
    let mut total = Quote::zero();
    for position in positions {
        if position.is_empty() {
            continue;
        }
        let pnl = position
            .unrealized_pnl(mark_for(position, prices)?)
            .ok_or(MarginError::Overflow)?;
        total = total.checked_add(pnl).ok_or(MarginError::Overflow)?;
    }
    Ok(total)
}

pub fn total_notional<'a>(
    positions: impl IntoIterator<Item = &'a Position>,
    prices: &PriceSnapshot,
) -> Result<Quote, MarginError> {
    let mut total = Quote::zero();
    for position in positions {
        if position.is_empty() {
            continue;
        }
        let notional = notional_value(position.size, mark_for(position, prices)?)?;
        total = total.checked_add(notional).ok_or(MarginError::Overflow)?;
    }
    Ok(total)
}

/// cash + sum of unrealized pnl. negative equity is legal and is not clamped.
pub fn account_equity(account: &AccountState, prices: &PriceSnapshot) -> Result<Quote, MarginError> {
    let pnl = total_unrealized_pnl(account.positions.values(), prices)?;
    account.balance.checked_add(pnl).ok_or(MarginError::Overflow)
}

/// IM over a position set. for pre-trade checks pass the post-trade set.
pub fn initial_margin_requirement<'a>(
    positions: impl IntoIterator<Item = &'a Position>,
    prices: &PriceSnapshot,
    params: &MarginParams,
) -> Result<Quote, MarginError> {
    apply_rate(total_notional(positions, prices)?, params.initial_margin_rate)
}

pub fn maintenance_margin_requirement<'a>(
    positions: impl IntoIterator<Item = &'a Position>,
    prices: &PriceSnapshot,
    params: &MarginParams,
) -> Result<Quote, MarginError> {
    apply_rate(total_notional(positions, prices)?, params.maintenance_margin_rate)
}

/// Calculate free margin (equity available for new positions)
pub fn free_margin(account_equity: Quote, margin_used: Quote) -> Result<Quote, MarginError> {
    account_equity.checked_sub(margin_used).ok_or(MarginError::Overflow)
}

fn apply_rate(notional: Quote, rate: Decimal) -> Result<Quote, MarginError> {
    notional.checked_mul(rate).ok_or(MarginError::Overflow)
}

pub fn is_liquidation_candidate(equity: Quote, maintenance_required: Quote) -> bool {
    equity < maintenance_required
}

// maintenance / equity as a percentage. can exceed 100, negative when equity is negative
pub fn margin_utilisation(equity: Quote, maintenance_required: Quote) -> Decimal {
    if maintenance_required.is_zero() {
        return Decimal::ZERO;
    }
    if equity.is_zero() {
        return Decimal::MAX;
    }
    // a tiny equity pushes the ratio past the decimal range. clamp it, keeping the sign
    let off_the_scale = if equity.value() < Decimal::ZERO {
        Decimal::MIN
    } else {
        Decimal::MAX
    };
    maintenance_required
        .value()
        .checked_div(equity.value())
        .and_then(|ratio| ratio.checked_mul(dec!(100)))
        .unwrap_or(off_the_scale)
}

/// Every figure for an account from one snapshot.
pub fn evaluate_account(
    account: &AccountState,
    prices: &PriceSnapshot,
    params: &MarginParams,
) -> Result<MarginFigures, MarginError> {
    let unrealized_pnl = total_unrealized_pnl(account.positions.values(), prices)?;
    let total_notional = total_notional(account.positions.values(), prices)?;
    let equity = account.balance.checked_add(unrealized_pnl).ok_or(MarginError::Overflow)?;
    let used_margin = apply_rate(total_notional, params.initial_margin_rate)?;
    let maintenance_margin = apply_rate(total_notional, params.maintenance_margin_rate)?;

    Ok(MarginFigures {
        balance: account.balance,
        unrealized_pnl,
        equity,
        total_notional,
        used_margin,
        maintenance_margin,
        free_margin: free_margin(equity, used_margin)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginStatus {
    Healthy,
    Warning,
    Liquidatable,
}

pub fn evaluate_margin_status(equity: Quote, initial: Quote, maintenance: Quote) -> MarginStatus {
    if equity >= initial {
        MarginStatus::Healthy
    } else if equity >= maintenance {
        MarginStatus::Warning
    } else {
        MarginStatus::Liquidatable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::from("BTC-PERP")
    }

    fn prices(mark: Decimal) -> PriceSnapshot {
        [(btc(), Price::new_unchecked(mark))].into_iter().collect()
    }

    fn account_with(balance: Decimal, size: Decimal, entry: Decimal) -> AccountState {
        let mut account = AccountState::with_balance(AccountId(1), Quote::new(balance));
        account.set_position(Position::new(btc(), SignedSize::new(size), Price::new_unchecked(entry)));
        account
    }

    #[test]
    fn notional_calculation() {
        let notional = notional_value(SignedSize::new(dec!(-0.1)), Price::new_unchecked(dec!(50000))).unwrap();
        assert_eq!(notional.value(), dec!(5000));
    }

    #[test]
    fn equity_after_price_drop() {
        let account = account_with(dec!(10000), dec!(0.1), dec!(50000));
        let equity = account_equity(&account, &prices(dec!(30000))).unwrap();
        assert_eq!(equity.value(), dec!(8000));
    }

    #[test]
    fn requirements_use_mark_price() {
        let account = account_with(dec!(10000), dec!(0.1), dec!(50000));
        let params = MarginParams::default();
        let snapshot = prices(dec!(30000));

        let im = initial_margin_requirement(account.positions.values(), &snapshot, &params).unwrap();
        let mm = maintenance_margin_requirement(account.positions.values(), &snapshot, &params).unwrap();
        assert_eq!(im.value(), dec!(600));
        assert_eq!(mm.value(), dec!(300));
    }

    #[test]
    fn figures_from_one_snapshot() {
        let account = account_with(dec!(10000), dec!(0.1), dec!(50000));
        let figures = evaluate_account(&account, &prices(dec!(30000)), &MarginParams::default()).unwrap();

        assert_eq!(figures.unrealized_pnl.value(), dec!(-2000));
        assert_eq!(figures.equity.value(), dec!(8000));
        assert_eq!(figures.used_margin.value(), dec!(600));
        assert_eq!(figures.maintenance_margin.value(), dec!(300));
        assert_eq!(figures.free_margin.value(), dec!(7400));
        assert!(!figures.is_liquidation_candidate());
        assert_eq!(figures.status(), MarginStatus::Healthy);
    }

    #[test]
    fn negative_equity_is_not_clamped() {
        let account = account_with(dec!(2000), dec!(1), dec!(50000));
        let figures = evaluate_account(&account, &prices(dec!(45000)), &MarginParams::default()).unwrap();

        assert_eq!(figures.equity.value(), dec!(-3000));
        assert_eq!(figures.maintenance_margin.value(), dec!(4500));
        assert!(figures.is_liquidation_candidate());
        assert_eq!(figures.status(), MarginStatus::Liquidatable);
    }

    #[test]
    fn missing_price_for_held_symbol() {
        let account = account_with(dec!(10000), dec!(0.1), dec!(50000));
        let result = account_equity(&account, &PriceSnapshot::new());
        assert_eq!(result, Err(MarginError::MissingMarkPrice(btc())));
    }

    #[test]
    fn flat_account_needs_no_prices() {
        let account = AccountState::with_balance(AccountId(1), Quote::new(dec!(500)));
        let figures = evaluate_account(&account, &PriceSnapshot::new(), &MarginParams::default()).unwrap();
        assert_eq!(figures.equity.value(), dec!(500));
        assert!(figures.maintenance_margin.is_zero());
        assert!(!figures.is_liquidation_candidate());
    }

    #[test]
    fn liquidation_at_exact_maintenance_is_safe() {
        assert!(!is_liquidation_candidate(Quote::new(dec!(5000)), Quote::new(dec!(5000))));
        assert!(is_liquidation_candidate(Quote::new(dec!(4999.99)), Quote::new(dec!(5000))));
    }

    #[test]
    fn margin_status_warning() {
        let status = evaluate_margin_status(Quote::new(dec!(400)), Quote::new(dec!(600)), Quote::new(dec!(300)));
        assert_eq!(status, MarginStatus::Warning);
    }

    #[test]
    fn utilisation_edges() {
        assert_eq!(margin_utilisation(Quote::new(dec!(1000)), Quote::zero()), Decimal::ZERO);
        assert_eq!(margin_utilisation(Quote::zero(), Quote::new(dec!(10))), Decimal::MAX);
        assert_eq!(margin_utilisation(Quote::new(dec!(12000)), Quote::new(dec!(5200))).round_dp(2), dec!(43.33));
    }

    #[test]
    fn utilisation_saturates_for_tiny_equity() {
        let dust = Quote::new(dec!(0.00000000000000000000001));
        let maintenance = Quote::new(dec!(36000));

        assert_eq!(margin_utilisation(dust, maintenance), Decimal::MAX);
        assert_eq!(margin_utilisation(Quote::new(-dust.value()), maintenance), Decimal::MIN);
    }

    #[test]
    fn overflowing_account_is_an_error() {
        let account = account_with(dec!(10000), dec!(1000), dec!(50000));
        let huge = Decimal::MAX / dec!(10);
        let params = MarginParams::default();

        assert_eq!(
            evaluate_account(&account, &prices(huge), &params),
            Err(MarginError::Overflow)
        );
        assert_eq!(
            total_notional(account.positions.values(), &prices(huge)),
            Err(MarginError::Overflow)
        );
        assert!(free_margin(Quote::new(Decimal::MIN), Quote::new(dec!(1))).is_err());
    }

    #[test]
    fn free_margin_calculation() {
        let free = free_margin(Quote::new(dec!(10000)), Quote::new(dec!(5000))).unwrap();
        assert_eq!(free.value(), dec!(5000));
    }
}
