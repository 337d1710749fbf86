use rust_decimal::{Decimal, RoundingStrategy};

/// Round to 2 decimal places, halves away from zero.
pub fn round(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
