//! Liquidity source adapters
//!
//! The source set is fixed: one bonding curve, any number of vaults, one
//! fallback market. `SourceId` is the closed dispatch point; every variant
//! answers the same three questions:
//! - `live_capacity`: how much output it can deliver right now
//! - `quote`: what a given input budget would buy (read-only)
//! - `fill`: execute inside a ledger transaction and report what moved

pub mod bonding_curve;
pub mod fallback;

pub use bonding_curve::BondingCurve;
pub use fallback::{FallbackEstimator, FallbackPool, SlippageTier};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    apply_bps, floor_amount, AccountId, SourceId, SourceQuote, Vault, BPS_DENOMINATOR,
};
use crate::error::{Result, VaultError};
use crate::ledger::{LedgerState, LedgerTx};

/// What one leg is allowed to do during Filling
#[derive(Debug, Clone)]
pub struct FillOrder<'p> {
    /// Identity vault settlement is authorized against
    pub engine: &'p AccountId,
    /// Account holding the pulled trade input
    pub escrow: &'p AccountId,
    pub recipient: &'p AccountId,
    /// Execution price (input per output)
    pub price: Decimal,
    /// Most input this leg may spend
    pub budget: Decimal,
    /// Output the plan assumed for this leg
    pub planned_output: Decimal,
    /// Fee tier for the fallback swap
    pub fee_tier_bps: u32,
}

/// What a successful fill moved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillReceipt {
    pub source: SourceId,
    pub input_spent: Decimal,
    pub output_received: Decimal,
    pub fee_paid: Decimal,
}

/// Largest output whose all-in vault cost fits `budget`:
/// `budget / (price * (1 + fee_bps / 10_000))`, rounded toward zero
pub fn vault_output_for_budget(budget: Decimal, price: Decimal, fee_bps: u32) -> Decimal {
    if budget <= Decimal::ZERO || price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let denominator = price * Decimal::from(BPS_DENOMINATOR + fee_bps);
    floor_amount(budget * Decimal::from(BPS_DENOMINATOR) / denominator)
}

impl SourceId {
    /// Output this source could deliver right now
    pub fn live_capacity(&self, state: &LedgerState) -> Decimal {
        match self {
            SourceId::Vault(id) => state
                .vault(*id)
                .filter(|v| v.listed)
                .map(Vault::max_fill)
                .unwrap_or(Decimal::ZERO),
            SourceId::BondingCurve => {
                let curve = state.bonding_curve();
                if curve.is_active() {
                    curve.real_output
                } else {
                    Decimal::ZERO
                }
            }
            SourceId::Fallback => state.fallback_pool().reserve_output,
        }
    }

    /// What `budget` of input would buy from this source at `price`.
    ///
    /// The fallback leg is priced with `estimator` rather than the pool.
    pub fn quote(
        &self,
        state: &LedgerState,
        budget: Decimal,
        price: Decimal,
        estimator: &FallbackEstimator,
    ) -> SourceQuote {
        match self {
            SourceId::Vault(id) => {
                let Some(vault) = state.vault(*id).filter(|v| v.listed) else {
                    return SourceQuote::new(*self, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
                };
                let desired = vault_output_for_budget(budget, price, vault.fee_bps());
                let q = vault.quote(desired, price);
                SourceQuote::new(*self, q.feasible_output, q.total_input(), q.fee)
            }
            SourceId::BondingCurve => {
                let curve = state.bonding_curve();
                let spend = budget.min(curve.max_input());
                let output = curve.quote_buy(spend);
                if output.is_zero() {
                    return SourceQuote::new(*self, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
                }
                SourceQuote::new(*self, output, spend, Decimal::ZERO)
            }
            SourceId::Fallback => SourceQuote::new(
                *self,
                estimator.estimate_output(budget, price),
                budget,
                estimator.fee_portion(budget),
            ),
        }
    }

    /// Execute this leg inside `tx`. On error the caller rolls back to its
    /// savepoint; nothing here needs to clean up after itself.
    pub fn fill(&self, tx: &mut LedgerTx<'_>, order: &FillOrder<'_>) -> Result<FillReceipt> {
        let input_asset = tx.state().pair.input.clone();
        let output_asset = tx.state().pair.output.clone();

        match self {
            SourceId::Vault(id) => {
                let vault = tx
                    .state()
                    .vault(*id)
                    .cloned()
                    .ok_or(VaultError::NotFound(id.0))?;
                if !vault.listed {
                    return Err(VaultError::NotListed(id.0).into());
                }
                if order.price < vault.params.min_acceptable_price {
                    return Err(VaultError::PriceBelowMinimum {
                        price: order.price,
                        minimum: vault.params.min_acceptable_price,
                    }
                    .into());
                }

                let affordable = vault_output_for_budget(order.budget, order.price, vault.fee_bps());
                let target = order.planned_output.min(vault.max_fill()).min(affordable);
                let quote = vault.quote(target, order.price);
                if quote.is_zero() {
                    return Err(VaultError::InsufficientLiquidity {
                        requested: order.planned_output,
                        available: vault.max_fill(),
                    }
                    .into());
                }

                let owed = tx.settle_vault(
                    order.engine,
                    *id,
                    quote.feasible_output,
                    order.recipient,
                    order.price,
                )?;
                tx.transfer(order.escrow, &vault.owner, &input_asset, owed)?;

                Ok(FillReceipt {
                    source: *self,
                    input_spent: owed,
                    output_received: quote.feasible_output,
                    fee_paid: quote.fee,
                })
            }
            SourceId::BondingCurve => {
                let spend = order.budget.min(tx.state().bonding_curve().max_input());
                if spend <= Decimal::ZERO {
                    return Err(crate::error::SluiceError::SourceUnavailable(
                        "bonding curve has no capacity".to_string(),
                    ));
                }
                let output = tx.bonding_curve_mut().apply_buy(spend)?;
                tx.debit(order.escrow, &input_asset, spend)?;
                tx.credit(order.recipient, &output_asset, output)?;

                Ok(FillReceipt {
                    source: *self,
                    input_spent: spend,
                    output_received: output,
                    fee_paid: Decimal::ZERO,
                })
            }
            SourceId::Fallback => {
                let output = tx
                    .fallback_pool_mut()
                    .apply_swap(order.budget, order.fee_tier_bps)?;
                tx.debit(order.escrow, &input_asset, order.budget)?;
                tx.credit(order.recipient, &output_asset, output)?;

                Ok(FillReceipt {
                    source: *self,
                    input_spent: order.budget,
                    output_received: output,
                    fee_paid: apply_bps(order.budget, order.fee_tier_bps),
                })
            }
        }
    }
}
