use rust_decimal::{Decimal, RoundingStrategy};

/// Quantity worth `notional` quote units at `price`, truncated to `precision` places
///
/// Truncation never rounds up past the notional; a result of zero means the
/// instrument's lot step is too coarse for the notional.
pub fn position_quantity(notional: Decimal, price: Decimal, precision: u32) -> Decimal {
    if price <= Decimal::ZERO || notional <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    (notional / price).round_dp_with_strategy(precision, RoundingStrategy::ToZero)
}
