//! Pre-execution safety gates
//!
//! Every gate is independent and side-effect free. Halt and replay are
//! structural and run at Accepted; the rest run at Validated. Any failure is
//! a rejection before funds move, never a downgrade to a partial fill.

pub mod replay;
pub mod volume;

pub use replay::CommitmentRegistry;
pub use volume::DailyVolumeCounter;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{DeviationPolicy, SafetyConfig};
use crate::domain::{deviation_bps, CallContext, CommitmentToken};
use crate::error::SafetyError;
use crate::ledger::{AdminParams, LedgerState};
use crate::price::{PriceSample, TwapTracker};

type GateResult<T> = std::result::Result<T, SafetyError>;

/// Price the trade is routed and settled at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PriceDecision {
    /// Oracle sample used as is
    Spot { price: Decimal },
    /// Spot strayed too far from the TWAP; TWAP used instead
    Substituted { spot: Decimal, twap: Decimal },
}

impl PriceDecision {
    pub fn price(&self) -> Decimal {
        match self {
            PriceDecision::Spot { price } => *price,
            PriceDecision::Substituted { twap, .. } => *twap,
        }
    }

    pub fn is_substituted(&self) -> bool {
        matches!(self, PriceDecision::Substituted { .. })
    }
}

/// MEV guard
#[derive(Debug, Clone)]
pub struct SafetyLayer {
    config: SafetyConfig,
}

impl SafetyLayer {
    pub fn new(config: SafetyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    // ==================== Accepted-stage gates ====================

    /// Halt switch. Blocks execution only; quoting and withdrawals ignore it.
    pub fn check_halt(&self, admin: &AdminParams) -> GateResult<()> {
        if admin.halted {
            warn!("Execution rejected: router halted");
            return Err(SafetyError::Halted);
        }
        Ok(())
    }

    pub fn check_replay(
        &self,
        registry: &CommitmentRegistry,
        token: Option<&CommitmentToken>,
    ) -> GateResult<()> {
        match token {
            Some(token) if registry.is_used(token) => {
                warn!("Execution rejected: commitment {} already consumed", token);
                Err(SafetyError::CommitmentReused(token.to_string()))
            }
            _ => Ok(()),
        }
    }

    // ==================== Validated-stage gates ====================

    /// The ultimate requester must hold a minimum of base currency
    pub fn check_standing_capital(&self, ctx: &CallContext) -> GateResult<()> {
        if ctx.origin_native_balance < self.config.min_standing_capital {
            warn!(
                "Execution rejected: {} holds {} base currency, needs {}",
                ctx.origin, ctx.origin_native_balance, self.config.min_standing_capital
            );
            return Err(SafetyError::InsufficientStandingCapital {
                required: self.config.min_standing_capital,
                held: ctx.origin_native_balance,
            });
        }
        Ok(())
    }

    /// Inclusion-priority price ceiling. The live ceiling is admin state.
    pub fn check_fee_price(&self, admin: &AdminParams, ctx: &CallContext) -> GateResult<()> {
        if admin.fee_price_ceiling.is_zero() {
            return Ok(());
        }
        if ctx.fee_price > admin.fee_price_ceiling {
            warn!(
                "Execution rejected: fee price {} above ceiling {}",
                ctx.fee_price, admin.fee_price_ceiling
            );
            return Err(SafetyError::FeePriceTooHigh {
                actual: ctx.fee_price,
                ceiling: admin.fee_price_ceiling,
            });
        }
        Ok(())
    }

    pub fn check_volume(
        &self,
        counter: &DailyVolumeCounter,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> GateResult<()> {
        if counter.would_exceed(amount, now) {
            let accumulated = counter.effective_accumulated(now);
            warn!(
                "Execution rejected: daily volume {} + {} exceeds {}",
                accumulated, amount, counter.limit
            );
            return Err(SafetyError::VolumeCapExceeded {
                accumulated,
                requested: amount,
                limit: counter.limit,
            });
        }
        Ok(())
    }

    /// Large trades only: compare spot to the TWAP reference.
    ///
    /// With no TWAP history there is nothing to compare against and the spot
    /// sample is used.
    pub fn check_price_sanity(
        &self,
        amount: Decimal,
        sample: &PriceSample,
        twap: &TwapTracker,
        now: DateTime<Utc>,
    ) -> GateResult<PriceDecision> {
        let spot = PriceDecision::Spot {
            price: sample.value,
        };
        if amount < self.config.large_trade_threshold {
            return Ok(spot);
        }
        let Some(reference) = twap.twap(now) else {
            debug!("No TWAP history, large trade priced at spot {}", sample.value);
            return Ok(spot);
        };

        let deviation = deviation_bps(reference, sample.value);
        if deviation <= Decimal::from(self.config.max_twap_deviation_bps) {
            return Ok(spot);
        }

        match self.config.deviation_policy {
            DeviationPolicy::Substitute => {
                warn!(
                    "Spot {} deviates {} bps from TWAP {}, substituting TWAP",
                    sample.value,
                    deviation.round_dp(2),
                    reference
                );
                Ok(PriceDecision::Substituted {
                    spot: sample.value,
                    twap: reference,
                })
            }
            DeviationPolicy::Reject => {
                warn!(
                    "Execution rejected: spot {} deviates {} bps from TWAP {}",
                    sample.value,
                    deviation.round_dp(2),
                    reference
                );
                Err(SafetyError::PriceDeviation {
                    spot: sample.value,
                    twap: reference,
                    deviation_bps: deviation,
                    max_bps: self.config.max_twap_deviation_bps,
                })
            }
        }
    }

    /// Run the Validated-stage gates in order and decide the execution price
    pub fn run_gates(
        &self,
        state: &LedgerState,
        amount: Decimal,
        ctx: &CallContext,
        sample: &PriceSample,
    ) -> GateResult<PriceDecision> {
        self.check_standing_capital(ctx)?;
        self.check_fee_price(&state.admin, ctx)?;
        self.check_volume(state.volume(), amount, ctx.now)?;
        self.check_price_sanity(amount, sample, state.twap(), ctx.now)
    }
}
