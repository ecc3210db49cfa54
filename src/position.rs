// 4.0: open position tracking. pnl = size * (mark - entry).
// 4.1 has the fill logic at the bottom: open, increase, reduce, close, flip.
// every product here is checked. None means the figure does not fit in a Decimal.

use crate::types::{Price, Quote, Side, SignedSize, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub size: SignedSize,
    pub entry_price: Price,
}

impl Position {
    pub fn new(symbol: Symbol, size: SignedSize, entry_price: Price) -> Self {
        Self {
            symbol,
            size,
            entry_price,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_zero()
    }

    // paper gains/losses based on current price
    pub fn unrealized_pnl(&self, mark_price: Price) -> Option<Quote> {
        calculate_unrealized_pnl(self.size, self.entry_price, mark_price)
    }

    pub fn notional_value(&self, mark_price: Price) -> Option<Quote> {
        self.size.abs().checked_mul(mark_price.value()).map(Quote::new)
    }
}

// 4.2: the pnl formula. size * (mark - entry). sign of size handles long vs short
pub fn calculate_unrealized_pnl(size: SignedSize, entry_price: Price, mark_price: Price) -> Option<Quote> {
    let move_per_unit = mark_price.value().checked_sub(entry_price.value())?;
    size.value().checked_mul(move_per_unit).map(Quote::new)
}

pub fn calculate_realized_pnl(close_size: SignedSize, entry_price: Price, exit_price: Price) -> Option<Quote> {
    calculate_unrealized_pnl(close_size, entry_price, exit_price)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillKind {
    Open,
    Increase,
    Reduce,
    Close,
    Flip,
}

impl FillKind {
    // reduce and close only shrink exposure, a flip opens new exposure on the other side
    pub fn is_risk_reducing(&self) -> bool {
        matches!(self, FillKind::Reduce | FillKind::Close)
    }
}

#[derive(Debug, Clone)]
pub struct FillOutcome {
    // None once the position is flat
    pub position: Option<Position>,
    pub realized_pnl: Quote,
    pub kind: FillKind,
}

// 4.3: applies a fill to the existing position (if any). pure, the caller decides whether
// to commit the outcome. None when the resulting size, entry or pnl overflows.
pub fn apply_fill(
    existing: Option<&Position>,
    symbol: &Symbol,
    side: Side,
    quantity: Decimal,
    price: Price,
) -> Option<FillOutcome> {
    debug_assert!(quantity > Decimal::ZERO, "fill quantity must be positive");

    let delta = SignedSize::from_side(side, quantity);

    let position = match existing {
        Some(position) if !position.is_empty() => position,
        _ => {
            return Some(FillOutcome {
                position: Some(Position::new(symbol.clone(), delta, price)),
                realized_pnl: Quote::zero(),
                kind: FillKind::Open,
            });
        }
    };

    if position.size.signum() == delta.signum() {
        return Some(FillOutcome {
            position: Some(increase_position(position, delta, price)?),
            realized_pnl: Quote::zero(),
            kind: FillKind::Increase,
        });
    }

    let position_abs = position.size.abs();
    let closed = quantity.min(position_abs);
    let close_size = SignedSize::new(position.size.signum() * closed);
    let realized_pnl = calculate_realized_pnl(close_size, position.entry_price, price)?;

    let outcome = if quantity < position_abs {
        let remaining = SignedSize::new(position.size.signum() * (position_abs - quantity));
        FillOutcome {
            position: Some(Position::new(position.symbol.clone(), remaining, position.entry_price)),
            realized_pnl,
            kind: FillKind::Reduce,
        }
    } else if quantity == position_abs {
        FillOutcome {
            position: None,
            realized_pnl,
            kind: FillKind::Close,
        }
    } else {
        let flipped = SignedSize::from_side(side, quantity - position_abs);
        FillOutcome {
            position: Some(Position::new(position.symbol.clone(), flipped, price)),
            realized_pnl,
            kind: FillKind::Flip,
        }
    };
    Some(outcome)
}

// 4.4: adds to existing position. averages the entry price
pub fn increase_position(position: &Position, delta: SignedSize, fill_price: Price) -> Option<Position> {
    debug_assert!(
        delta.signum() == position.size.signum() || position.is_empty(),
        "increase must be same direction as existing position"
    );

    let new_size = position.size.checked_add(delta.value())?;

    let old_cost = position.size.abs().checked_mul(position.entry_price.value())?;
    let added_cost = delta.abs().checked_mul(fill_price.value())?;
    let weighted_sum = old_cost.checked_add(added_cost)?;
    let new_entry = Price::new_unchecked(weighted_sum.checked_div(new_size.abs())?);

    Some(Position::new(position.symbol.clone(), new_size, new_entry))
}
