//! Structural validation of trade requests and route plans
//!
//! These checks run at Accepted, before any gate or balance is touched. A
//! request failing here is malformed, not adversarial.

use crate::domain::{RoutePlan, SourceKind, TradeRequest, BPS_DENOMINATOR};
use crate::error::{Result, SluiceError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Validate trade size against the configured bounds
///
/// # Arguments
/// * `amount` - Input amount of the trade
/// * `min` / `max` - Inclusive size bounds
pub fn validate_trade_size(amount: Decimal, min: Decimal, max: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(SluiceError::ZeroAmount);
    }

    if amount < min || amount > max {
        return Err(SluiceError::SizeOutOfBounds { amount, min, max });
    }

    Ok(())
}

/// Validate that a deadline is still in the future
pub fn validate_deadline(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if deadline <= now {
        return Err(SluiceError::DeadlineExpired { deadline, now });
    }
    Ok(())
}

/// Validate a basis-point value
pub fn validate_bps(bps: u32, field_name: &str) -> Result<()> {
    if bps > BPS_DENOMINATOR {
        return Err(SluiceError::Validation(format!(
            "{} cannot exceed {} bps: {}",
            field_name, BPS_DENOMINATOR, bps
        )));
    }
    Ok(())
}

/// Validate the request fields that do not depend on configuration
pub fn validate_request(request: &TradeRequest) -> Result<()> {
    if request.trader.is_empty() {
        return Err(SluiceError::Validation("trader cannot be empty".to_string()));
    }

    if request.min_output < Decimal::ZERO {
        return Err(SluiceError::Validation(format!(
            "min_output cannot be negative: {}",
            request.min_output
        )));
    }

    validate_bps(request.max_liquidity_drift_bps, "max_liquidity_drift_bps")?;

    if let Some(token) = &request.commitment {
        if token.is_empty() {
            return Err(SluiceError::Validation(
                "commitment token cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validate that `plan` was built for a trade of `input_amount`
///
/// Legs must be non-empty, sum to the plan totals, use each of the bonding
/// curve and fallback at most once, and keep the fallback last.
pub fn validate_plan_shape(plan: &RoutePlan, input_amount: Decimal) -> Result<()> {
    if plan.legs.is_empty() {
        return Err(SluiceError::InvalidPlan("plan has no legs".to_string()));
    }

    if plan.total_input != input_amount {
        return Err(SluiceError::InvalidPlan(format!(
            "plan spends {} but request inputs {}",
            plan.total_input, input_amount
        )));
    }

    if plan.price <= Decimal::ZERO {
        return Err(SluiceError::InvalidPlan(format!(
            "plan price must be positive: {}",
            plan.price
        )));
    }

    if plan.baseline_output < Decimal::ZERO {
        return Err(SluiceError::InvalidPlan(format!(
            "negative baseline output {}",
            plan.baseline_output
        )));
    }

    if plan
        .legs
        .iter()
        .any(|l| l.input_cost < Decimal::ZERO || l.output_amount < Decimal::ZERO)
    {
        return Err(SluiceError::InvalidPlan("negative leg amount".to_string()));
    }

    let leg_input = checked_sum(plan.legs.iter().map(|l| l.input_cost))?;
    let leg_output = checked_sum(plan.legs.iter().map(|l| l.output_amount))?;
    if leg_input != plan.total_input || leg_output != plan.total_output {
        return Err(SluiceError::InvalidPlan(
            "leg amounts do not add up to plan totals".to_string(),
        ));
    }

    if plan.legs.iter().any(|l| l.kind != l.source.kind()) {
        return Err(SluiceError::InvalidPlan(
            "leg kind does not match its source".to_string(),
        ));
    }

    if plan.legs_of(SourceKind::BondingCurve).count() > 1 {
        return Err(SluiceError::InvalidPlan(
            "bonding curve appears more than once".to_string(),
        ));
    }

    let fallback_count = plan.legs_of(SourceKind::Fallback).count();
    if fallback_count > 1 {
        return Err(SluiceError::InvalidPlan(
            "fallback appears more than once".to_string(),
        ));
    }
    if fallback_count == 1 && plan.legs.last().map(|l| l.kind) != Some(SourceKind::Fallback) {
        return Err(SluiceError::InvalidPlan(
            "fallback leg must come last".to_string(),
        ));
    }

    Ok(())
}

fn checked_sum(mut amounts: impl Iterator<Item = Decimal>) -> Result<Decimal> {
    amounts
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
        .ok_or_else(|| SluiceError::InvalidPlan("leg amounts overflow".to_string()))
}
