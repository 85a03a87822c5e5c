//! Currency rounding. Amounts are kept at two decimals everywhere; whole-unit
//! rounding only exists for display.

use rust_decimal::{Decimal, RoundingStrategy};

/// Minor-unit precision of every stored amount
pub const MONEY_DP: u32 = 2;

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Whole currency units, used for the `display_total` response field.
pub fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds up to the next whole currency unit.
pub fn ceil_whole(value: Decimal) -> Decimal {
    value.ceil()
}
