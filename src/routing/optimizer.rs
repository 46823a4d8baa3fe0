//! Route optimizer
//!
//! Splits a trade's input budget across the bonding curve, listed vaults and
//! the fallback market. `plan` is a pure function of ledger state and the
//! price sample, so the same inputs always give the same plan.
//!
//! Each source's rate is constant up to its own capacity, so greedy
//! cheapest-first filling is optimal. A source only enters if its all-in rate
//! beats the fallback estimate at full trade size; the remainder then pays a
//! fallback impact no worse than the full-size one, which keeps
//! `total_output >= baseline_output`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::{
    floor_amount, RoutePlan, SourceId, SourceQuote, TradeRequest, Vault, BPS_DENOMINATOR,
};
use crate::error::{Result, SluiceError};
use crate::ledger::LedgerState;
use crate::price::{PriceFeed, PriceSample};
use crate::sources::{vault_output_for_budget, FallbackEstimator};

pub struct RouteOptimizer {
    estimator: FallbackEstimator,
}

impl RouteOptimizer {
    pub fn new(estimator: FallbackEstimator) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &FallbackEstimator {
        &self.estimator
    }

    /// Fetch a usable price and build a plan for `request`.
    ///
    /// PriceFeed failures propagate; no plan is produced on a stale or
    /// invalid sample.
    pub async fn quote(
        &self,
        feed: &PriceFeed,
        request: &TradeRequest,
        state: &LedgerState,
        now: DateTime<Utc>,
    ) -> Result<RoutePlan> {
        let sample = feed.get_price(now).await?;
        self.plan(request.input_amount, state, &sample)
    }

    /// Allocate `amount` of input across sources at `sample`
    pub fn plan(
        &self,
        amount: Decimal,
        state: &LedgerState,
        sample: &PriceSample,
    ) -> Result<RoutePlan> {
        if amount <= Decimal::ZERO {
            return Err(SluiceError::ZeroAmount);
        }
        let price = sample.value;
        let fallback_bps = self.estimator.impact_bps(amount);
        let baseline_output = self.estimator.estimate_output(amount, price);

        let mut legs: Vec<SourceQuote> = Vec::new();
        let mut remaining = amount;

        // Bonding curve first, winner-take-first
        if state.bonding_curve().is_active() {
            let quote = SourceId::BondingCurve.quote(state, remaining, price, &self.estimator);
            if !quote.output_amount.is_zero()
                && beats_fallback(quote.input_cost, quote.output_amount, price, fallback_bps)
            {
                debug!(
                    "Bonding curve admitted: {} in -> {} out",
                    quote.input_cost, quote.output_amount
                );
                remaining -= quote.input_cost;
                legs.push(quote);
            } else {
                debug!("Bonding curve does not beat fallback at size {}", amount);
            }
        }

        // Vaults, cheapest first
        let mut vaults: Vec<&Vault> = state
            .listed_vaults()
            .filter(|v| vault_beats_fallback(v.fee_bps(), fallback_bps))
            .collect();
        vaults.sort_by_key(|v| (v.fee_bps(), v.id));

        for vault in vaults {
            if remaining <= Decimal::ZERO {
                break;
            }
            let full = vault.quote(vault.max_fill(), price);
            if full.is_zero() {
                debug!("{} skipped: zero feasible output", vault.id);
                continue;
            }

            if full.total_input() <= remaining {
                remaining -= full.total_input();
                legs.push(SourceQuote::new(
                    SourceId::Vault(vault.id),
                    full.feasible_output,
                    full.total_input(),
                    full.fee,
                ));
                continue;
            }

            // Partial fill that exhausts the rest of the budget
            let output = vault_output_for_budget(remaining, price, vault.fee_bps());
            let partial = vault.quote(output, price);
            if !partial.is_zero() {
                legs.push(SourceQuote::new(
                    SourceId::Vault(vault.id),
                    partial.feasible_output,
                    remaining,
                    partial.fee,
                ));
                remaining = Decimal::ZERO;
            }
            break;
        }

        if remaining > Decimal::ZERO {
            legs.push(SourceId::Fallback.quote(state, remaining, price, &self.estimator));
        }

        let total_output: Decimal = legs.iter().map(|l| l.output_amount).sum();
        if total_output < baseline_output {
            // Rounding left the split behind the baseline; route everything to fallback
            debug!(
                "Split output {} below baseline {}, using pure fallback",
                total_output, baseline_output
            );
            legs = vec![SourceId::Fallback.quote(state, amount, price, &self.estimator)];
        }

        let total_output: Decimal = legs.iter().map(|l| l.output_amount).sum();
        let total_input: Decimal = legs.iter().map(|l| l.input_cost).sum();
        let savings = (total_output - baseline_output).max(Decimal::ZERO);

        info!(
            "Route plan: {} legs, {} in -> {} out (baseline {}, savings {})",
            legs.len(),
            total_input,
            total_output,
            baseline_output,
            savings
        );

        Ok(RoutePlan {
            legs,
            total_output,
            total_input,
            baseline_output,
            savings,
            price,
            price_observed_at: sample.observed_at,
        })
    }
}

/// `cost / output < price / (1 - fallback_bps)`, cross-multiplied
fn beats_fallback(cost: Decimal, output: Decimal, price: Decimal, fallback_bps: u32) -> bool {
    let kept = Decimal::from(BPS_DENOMINATOR.saturating_sub(fallback_bps));
    cost * kept < floor_amount(output * price) * Decimal::from(BPS_DENOMINATOR)
}

/// `price * (1 + fee) < price / (1 - fallback_bps)`
fn vault_beats_fallback(fee_bps: u32, fallback_bps: u32) -> bool {
    let denom = u64::from(BPS_DENOMINATOR);
    let all_in = denom + u64::from(fee_bps);
    let kept = denom.saturating_sub(u64::from(fallback_bps));
    all_in * kept < denom * denom
}
