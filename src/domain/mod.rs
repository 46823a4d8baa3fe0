pub mod account;
pub mod event;
pub mod plan;
pub mod state;
pub mod trade;
pub mod vault;

pub use account::*;
pub use event::*;
pub use plan::*;
pub use state::*;
pub use trade::*;
pub use vault::*;

use rust_decimal::{Decimal, RoundingStrategy};

/// Basis-point denominator (1 bps = 1/10_000)
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Decimal places kept on amounts derived by division
pub const AMOUNT_SCALE: u32 = 12;

/// `amount * bps / 10_000`
pub fn apply_bps(amount: Decimal, bps: u32) -> Decimal {
    amount * Decimal::from(bps) / Decimal::from(BPS_DENOMINATOR)
}

/// Round an amount toward zero at `AMOUNT_SCALE`.
///
/// Used wherever an amount is derived by inverting a cost, so the cost of the
/// rounded amount never exceeds the budget it came from.
pub fn floor_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToZero)
}

/// Relative gap between two values in basis points, measured against `reference`.
///
/// Saturates at `Decimal::MAX` when the gap is too large to represent.
pub fn deviation_bps(reference: Decimal, candidate: Decimal) -> Decimal {
    if reference <= Decimal::ZERO {
        return Decimal::MAX;
    }
    candidate
        .checked_sub(reference)
        .map(|gap| gap.abs())
        .and_then(|gap| gap.checked_mul(Decimal::from(BPS_DENOMINATOR)))
        .and_then(|scaled| scaled.checked_div(reference))
        .unwrap_or(Decimal::MAX)
}
