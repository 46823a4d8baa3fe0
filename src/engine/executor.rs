//! Execution engine
//!
//! Drives one trade through Accepted -> Validated -> Filling -> Settled, or
//! to Reverted. Nothing touches the ledger before Filling; from Filling on,
//! every movement happens inside one `LedgerTx`, so a trade either commits
//! whole or leaves no trace.

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::outcome::{ExecutionReport, FillOutcome};
use crate::config::AppConfig;
use crate::domain::{
    CallContext, ExecutionState, LegFill, RouterEvent, RoutePlan, SourceId, SourceKind,
    TradeRequest, BPS_DENOMINATOR,
};
use crate::error::{Result, SafetyError, SluiceError};
use crate::ledger::{LedgerState, LedgerTx};
use crate::price::{PriceFeed, PriceSample};
use crate::safety::{PriceDecision, SafetyLayer};
use crate::sources::FillOrder;
use crate::validation::{
    validate_deadline, validate_plan_shape, validate_request, validate_trade_size,
};

/// Limits the engine enforces on every request
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub min_trade_size: Decimal,
    pub max_trade_size: Decimal,
    /// Fee tier the fallback sweep swaps at
    pub fallback_fee_tier_bps: u32,
}

impl EngineConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            min_trade_size: config.router.min_trade_size,
            max_trade_size: config.router.max_trade_size,
            fallback_fee_tier_bps: config.fallback.fee_tier_bps,
        }
    }
}

pub struct ExecutionEngine {
    config: EngineConfig,
    safety: SafetyLayer,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig, safety: SafetyLayer) -> Self {
        Self { config, safety }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn safety(&self) -> &SafetyLayer {
        &self.safety
    }

    /// Execute `plan` for `request`.
    ///
    /// The caller must hold exclusive access to `state` for the whole call;
    /// that is what serializes trades. The only await happens before any
    /// balance moves.
    pub async fn execute(
        &self,
        feed: &PriceFeed,
        state: &mut LedgerState,
        request: &TradeRequest,
        plan: &RoutePlan,
        ctx: &CallContext,
    ) -> Result<ExecutionReport> {
        let trade_id = Uuid::new_v4();

        if let Err(e) = self.accept(state, request, plan, ctx) {
            warn!("Trade {} rejected before acceptance: {}", trade_id, e);
            return Err(e);
        }
        let mut stage = ExecutionState::Accepted;
        info!(
            "Trade {} {}: {} {} from {} (min output {})",
            trade_id, stage, request.input_amount, state.pair.input, request.trader, request.min_output
        );

        let (sample, decision) = match self.validate(feed, state, request, plan, ctx).await {
            Ok(validated) => validated,
            Err(e) => {
                warn!("Trade {} {} -> {}: {}", trade_id, stage, ExecutionState::Reverted, e);
                return Err(e);
            }
        };
        stage = transition(trade_id, stage, ExecutionState::Validated)?;
        stage = transition(trade_id, stage, ExecutionState::Filling)?;

        match self.fill(state, trade_id, request, plan, ctx, &sample, decision) {
            Ok(report) => {
                transition(trade_id, stage, ExecutionState::Settled)?;
                Ok(report)
            }
            Err(e) => {
                transition(trade_id, stage, ExecutionState::Reverted)?;
                warn!("Trade {} reverted, all movements unwound: {}", trade_id, e);
                Err(e)
            }
        }
    }

    /// Structural checks. Reads state, never writes it.
    pub fn accept(
        &self,
        state: &LedgerState,
        request: &TradeRequest,
        plan: &RoutePlan,
        ctx: &CallContext,
    ) -> Result<()> {
        if request.input_amount <= Decimal::ZERO {
            return Err(SluiceError::ZeroAmount);
        }
        validate_deadline(request.deadline, ctx.now)?;
        validate_request(request)?;
        if ctx.caller != request.trader {
            return Err(SluiceError::Unauthorized(format!(
                "{} cannot execute on behalf of {}",
                ctx.caller, request.trader
            )));
        }
        self.safety
            .check_replay(state.commitments(), request.commitment.as_ref())?;
        self.safety.check_halt(&state.admin)?;
        validate_trade_size(
            request.input_amount,
            self.config.min_trade_size,
            self.config.max_trade_size,
        )?;
        validate_plan_shape(plan, request.input_amount)
    }

    /// Safety gates plus plan re-validation against the current price
    async fn validate(
        &self,
        feed: &PriceFeed,
        state: &LedgerState,
        request: &TradeRequest,
        plan: &RoutePlan,
        ctx: &CallContext,
    ) -> Result<(PriceSample, PriceDecision)> {
        let sample = feed.get_price(ctx.now).await?;
        let decision = self
            .safety
            .run_gates(state, request.input_amount, ctx, &sample)?;

        let max_bps = self.safety.config().max_plan_deviation_bps;
        if !feed.validate_against(plan.price, max_bps, ctx.now).await? {
            return Err(SluiceError::InvalidPlan(format!(
                "plan price {} no longer within {} bps of the current price",
                plan.price, max_bps
            )));
        }
        Ok((sample, decision))
    }

    #[allow(clippy::too_many_arguments)]
    fn fill(
        &self,
        state: &mut LedgerState,
        trade_id: Uuid,
        request: &TradeRequest,
        plan: &RoutePlan,
        ctx: &CallContext,
        sample: &PriceSample,
        decision: PriceDecision,
    ) -> Result<ExecutionReport> {
        let price = decision.price();
        let admin = state.admin.clone();
        let pair = state.pair.clone();
        let trader = &request.trader;
        let amount = request.input_amount;

        let mut tx = LedgerTx::begin(state, ctx.now);
        let output_before = tx.balance(trader, &pair.output);
        let escrow_before = tx.balance(&admin.escrow, &pair.input);
        tx.transfer(trader, &admin.escrow, &pair.input, amount)?;
        debug!("Trade {} pulled {} {} into escrow", trade_id, amount, pair.input);

        let mut outcomes = Vec::with_capacity(plan.legs.len() + 1);
        let mut spent = Decimal::ZERO;

        for leg in plan.legs.iter().filter(|l| l.kind != SourceKind::Fallback) {
            let live = leg.source.live_capacity(tx.state());
            if let Some(drift) =
                drift_beyond(leg.output_amount, live, request.max_liquidity_drift_bps)
            {
                let reason = format!(
                    "live capacity drifted {} bps (tolerance {} bps)",
                    drift.round_dp(2),
                    request.max_liquidity_drift_bps
                );
                warn!("Trade {} skipping {}: {}", trade_id, leg.source, reason);
                tx.emit(RouterEvent::SourceSkipped {
                    trade_id,
                    source: leg.source,
                    reason: reason.clone(),
                    expected_output: leg.output_amount,
                    live_capacity: live,
                });
                outcomes.push(FillOutcome::Skipped {
                    source: leg.source,
                    reason,
                    expected_output: leg.output_amount,
                    live_capacity: live,
                });
                continue;
            }

            let order = FillOrder {
                engine: &admin.engine_identity,
                escrow: &admin.escrow,
                recipient: trader,
                price,
                budget: leg.input_cost.min(amount - spent),
                planned_output: leg.output_amount,
                fee_tier_bps: self.config.fallback_fee_tier_bps,
            };
            let savepoint = tx.savepoint();
            match leg.source.fill(&mut tx, &order) {
                Ok(receipt) => {
                    debug!(
                        "Trade {} filled {}: {} in -> {} out",
                        trade_id, receipt.source, receipt.input_spent, receipt.output_received
                    );
                    spent += receipt.input_spent;
                    outcomes.push(FillOutcome::Filled(receipt));
                }
                Err(e) => {
                    tx.rollback_to(savepoint);
                    warn!("Trade {} fill on {} failed: {}", trade_id, leg.source, e);
                    tx.emit(RouterEvent::SourceFailed {
                        trade_id,
                        source: leg.source,
                        reason: e.to_string(),
                    });
                    outcomes.push(FillOutcome::Failed {
                        source: leg.source,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Everything not consumed above goes through the fallback in one swap
        let residual = amount - spent;
        let mut refunded = Decimal::ZERO;
        if residual > Decimal::ZERO {
            let order = FillOrder {
                engine: &admin.engine_identity,
                escrow: &admin.escrow,
                recipient: trader,
                price,
                budget: residual,
                planned_output: plan
                    .fallback_leg()
                    .map(|l| l.output_amount)
                    .unwrap_or(Decimal::ZERO),
                fee_tier_bps: self.config.fallback_fee_tier_bps,
            };
            let savepoint = tx.savepoint();
            match SourceId::Fallback.fill(&mut tx, &order) {
                Ok(receipt) => {
                    debug!(
                        "Trade {} swept {} through fallback -> {} out",
                        trade_id, receipt.input_spent, receipt.output_received
                    );
                    outcomes.push(FillOutcome::Filled(receipt));
                }
                Err(e) => {
                    tx.rollback_to(savepoint);
                    warn!(
                        "Trade {} fallback sweep failed, refunding {}: {}",
                        trade_id, residual, e
                    );
                    tx.emit(RouterEvent::SourceFailed {
                        trade_id,
                        source: SourceId::Fallback,
                        reason: e.to_string(),
                    });
                    outcomes.push(FillOutcome::Failed {
                        source: SourceId::Fallback,
                        reason: e.to_string(),
                    });
                    tx.transfer(&admin.escrow, trader, &pair.input, residual)?;
                    refunded = residual;
                }
            }
        }

        let actual_output = tx.balance(trader, &pair.output) - output_before;
        if actual_output < request.min_output {
            warn!(
                "Trade {} output {} below minimum {}",
                trade_id, actual_output, request.min_output
            );
            return Err(SluiceError::SlippageExceeded {
                min_output: request.min_output,
                actual_output,
            });
        }

        let consumed: Decimal = outcomes
            .iter()
            .filter_map(FillOutcome::receipt)
            .map(|r| r.input_spent)
            .sum();
        let escrow_after = tx.balance(&admin.escrow, &pair.input);
        if consumed + refunded != amount || escrow_after != escrow_before {
            error!(
                "Trade {} conservation check failed: consumed {} + refunded {} != {} (escrow {} -> {})",
                trade_id, consumed, refunded, amount, escrow_before, escrow_after
            );
            return Err(SluiceError::Internal(
                "input conservation violated".to_string(),
            ));
        }

        if let Some(token) = &request.commitment {
            if !tx.consume_commitment(token) {
                return Err(SafetyError::CommitmentReused(token.to_string()).into());
            }
        }
        tx.volume_mut().record(amount, ctx.now);
        tx.twap_mut().record(*sample);

        let savings = (actual_output - plan.baseline_output).max(Decimal::ZERO);
        {
            let stats = tx.stats_mut();
            stats.trade_count += 1;
            stats.total_input += consumed;
            stats.total_output += actual_output;
            stats.total_savings += savings;
        }

        tx.emit(RouterEvent::TradeExecuted {
            trade_id,
            trader: trader.clone(),
            input_amount: consumed,
            output_amount: actual_output,
            refunded,
            legs: outcomes
                .iter()
                .filter_map(FillOutcome::receipt)
                .map(LegFill::from)
                .collect(),
            savings,
        });
        tx.commit();

        info!(
            "Trade {} settled: {} in -> {} out, refunded {}, savings {}",
            trade_id, consumed, actual_output, refunded, savings
        );

        Ok(ExecutionReport {
            trade_id,
            state: ExecutionState::Settled,
            input_amount: amount,
            actual_output,
            refunded,
            savings,
            price: decision,
            outcomes,
        })
    }
}

fn transition(
    trade_id: Uuid,
    from: ExecutionState,
    to: ExecutionState,
) -> Result<ExecutionState> {
    if !from.can_transition_to(to) {
        return Err(SluiceError::Internal(format!(
            "invalid execution transition {} -> {}",
            from, to
        )));
    }
    debug!("Trade {} {} -> {}", trade_id, from, to);
    Ok(to)
}

/// How far `live` fell below `planned`, in bps, when that exceeds `max_bps`
fn drift_beyond(planned: Decimal, live: Decimal, max_bps: u32) -> Option<Decimal> {
    if planned <= Decimal::ZERO || live >= planned {
        return None;
    }
    let shortfall = Decimal::ONE - live.max(Decimal::ZERO) / planned;
    let drift = shortfall * Decimal::from(BPS_DENOMINATOR);
    (drift > Decimal::from(max_bps)).then_some(drift)
}
