//! Constant-product fallback market
//!
//! Two parts: the pool itself (actual swaps during the sweep) and the
//! estimator the optimizer uses to price the fallback leg without calling the
//! pool. The estimate is `fee_tier + slippage_tier(size)` bps off the oracle
//! price, where slippage tiers form a non-decreasing step function of size.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{apply_bps, floor_amount, BPS_DENOMINATOR};
use crate::error::{Result, SluiceError};

/// One step of the slippage model: sizes up to `max_input` pay `slippage_bps`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlippageTier {
    pub max_input: Decimal,
    pub slippage_bps: u32,
}

/// Price-impact model for the fallback leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEstimator {
    pub fee_tier_bps: u32,
    /// Sorted by `max_input`; sizes above the last tier pay the last tier's bps
    pub tiers: Vec<SlippageTier>,
}

impl FallbackEstimator {
    pub fn new(fee_tier_bps: u32, tiers: Vec<SlippageTier>) -> Self {
        Self {
            fee_tier_bps,
            tiers,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(SluiceError::Validation(
                "fallback estimator needs at least one slippage tier".to_string(),
            ));
        }
        for pair in self.tiers.windows(2) {
            if pair[1].max_input <= pair[0].max_input {
                return Err(SluiceError::Validation(
                    "slippage tiers must be sorted by strictly increasing max_input".to_string(),
                ));
            }
            if pair[1].slippage_bps < pair[0].slippage_bps {
                return Err(SluiceError::Validation(
                    "slippage tiers must have non-decreasing slippage_bps".to_string(),
                ));
            }
        }
        if self.total_bps_cap() >= BPS_DENOMINATOR {
            return Err(SluiceError::Validation(
                "fee tier plus slippage must stay below 10000 bps".to_string(),
            ));
        }
        Ok(())
    }

    fn total_bps_cap(&self) -> u32 {
        let worst = self.tiers.last().map(|t| t.slippage_bps).unwrap_or(0);
        self.fee_tier_bps + worst
    }

    /// Total bps (fee tier + slippage) charged at `size`
    pub fn impact_bps(&self, size: Decimal) -> u32 {
        let slippage = self
            .tiers
            .iter()
            .find(|tier| size <= tier.max_input)
            .or_else(|| self.tiers.last())
            .map(|tier| tier.slippage_bps)
            .unwrap_or(0);
        self.fee_tier_bps + slippage
    }

    /// Estimated output for `input` at oracle `price`
    pub fn estimate_output(&self, input: Decimal, price: Decimal) -> Decimal {
        if input <= Decimal::ZERO || price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let kept_bps = BPS_DENOMINATOR.saturating_sub(self.impact_bps(input));
        floor_amount(apply_bps(input, kept_bps) / price)
    }

    /// Fee portion of an input routed through the fallback
    pub fn fee_portion(&self, input: Decimal) -> Decimal {
        apply_bps(input, self.fee_tier_bps)
    }
}

/// Constant-product pool with a single fee tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackPool {
    pub reserve_input: Decimal,
    pub reserve_output: Decimal,
    pub fee_tier_bps: u32,
    pub enabled: bool,
}

impl FallbackPool {
    pub fn new(reserve_input: Decimal, reserve_output: Decimal, fee_tier_bps: u32) -> Self {
        Self {
            reserve_input,
            reserve_output,
            fee_tier_bps,
            enabled: true,
        }
    }

    /// Output of swapping exactly `amount_in`
    pub fn quote_exact_input(&self, amount_in: Decimal) -> Decimal {
        if !self.enabled || amount_in <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let after_fee = apply_bps(amount_in, BPS_DENOMINATOR - self.fee_tier_bps.min(BPS_DENOMINATOR));
        let denominator = self.reserve_input + after_fee;
        if denominator <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        floor_amount(self.reserve_output * after_fee / denominator)
    }

    /// Swap exactly `amount_in` at `fee_tier_bps`. No minimum is enforced here.
    pub fn apply_swap(&mut self, amount_in: Decimal, fee_tier_bps: u32) -> Result<Decimal> {
        if !self.enabled {
            return Err(SluiceError::SourceUnavailable(
                "fallback pool disabled".to_string(),
            ));
        }
        if fee_tier_bps != self.fee_tier_bps {
            return Err(SluiceError::SourceUnavailable(format!(
                "no fallback pool at fee tier {} bps",
                fee_tier_bps
            )));
        }
        if amount_in <= Decimal::ZERO {
            return Err(SluiceError::ZeroAmount);
        }

        let output = self.quote_exact_input(amount_in);
        if output.is_zero() || output >= self.reserve_output {
            return Err(SluiceError::SourceUnavailable(format!(
                "fallback pool cannot fill {} (reserve {})",
                amount_in, self.reserve_output
            )));
        }

        self.reserve_input += amount_in;
        self.reserve_output -= output;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn estimator() -> FallbackEstimator {
        FallbackEstimator::new(
            30,
            vec![
                SlippageTier {
                    max_input: dec!(50000),
                    slippage_bps: 50,
                },
                SlippageTier {
                    max_input: dec!(250000),
                    slippage_bps: 120,
                },
                SlippageTier {
                    max_input: dec!(1000000),
                    slippage_bps: 250,
                },
            ],
        )
    }

    #[test]
    fn test_impact_is_step_function_of_size() {
        let e = estimator();
        assert_eq!(e.impact_bps(dec!(10000)), 80);
        assert_eq!(e.impact_bps(dec!(50000)), 80);
        assert_eq!(e.impact_bps(dec!(50001)), 150);
        assert_eq!(e.impact_bps(dec!(5000000)), 280);
    }

    #[test]
    fn test_impact_monotonic() {
        let e = estimator();
        let mut last = 0;
        for size in [1, 10_000, 60_000, 300_000, 2_000_000] {
            let bps = e.impact_bps(Decimal::from(size));
            assert!(bps >= last);
            last = bps;
        }
    }

    #[test]
    fn test_estimate_output() {
        let e = estimator();
        // 10000 * 0.992 / 2500
        assert_eq!(e.estimate_output(dec!(10000), dec!(2500)), dec!(3.968));
    }

    #[test]
    fn test_validate_rejects_unsorted_tiers() {
        let mut e = estimator();
        e.tiers.swap(0, 1);
        assert!(e.validate().is_err());
        assert!(estimator().validate().is_ok());
    }

    #[test]
    fn test_pool_swap_moves_reserves() {
        let mut pool = FallbackPool::new(dec!(25000000), dec!(10000), 30);
        let expected = pool.quote_exact_input(dec!(10000));
        let out = pool.apply_swap(dec!(10000), 30).unwrap();
        assert_eq!(out, expected);
        assert_eq!(pool.reserve_input, dec!(25010000));
        assert_eq!(pool.reserve_output, dec!(10000) - out);
    }

    #[test]
    fn test_pool_rejects_wrong_tier_and_disabled() {
        let mut pool = FallbackPool::new(dec!(1000), dec!(1000), 30);
        assert!(pool.apply_swap(dec!(10), 5).is_err());
        pool.enabled = false;
        assert!(pool.apply_swap(dec!(10), 30).is_err());
    }
}
