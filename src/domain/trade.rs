use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, CommitmentToken};

/// Trade request (what the trader wants)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub trader: AccountId,
    /// Input asset amount to spend
    pub input_amount: Decimal,
    /// Minimum total output the trader accepts
    pub min_output: Decimal,
    /// Must still be in the future at acceptance
    pub deadline: DateTime<Utc>,
    /// Tolerated drop of a source's live capacity since quoting, in bps
    pub max_liquidity_drift_bps: u32,
    #[serde(default)]
    pub commitment: Option<CommitmentToken>,
}

impl TradeRequest {
    pub fn new(
        trader: AccountId,
        input_amount: Decimal,
        min_output: Decimal,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            trader,
            input_amount,
            min_output,
            deadline,
            max_liquidity_drift_bps: 100,
            commitment: None,
        }
    }

    pub fn with_commitment(mut self, token: CommitmentToken) -> Self {
        self.commitment = Some(token);
        self
    }

    pub fn with_drift_tolerance(mut self, bps: u32) -> Self {
        self.max_liquidity_drift_bps = bps;
        self
    }
}

/// Per-call context: who is calling, what they hold, and when.
///
/// Passed explicitly into every public operation instead of reading ambient
/// state, so the safety gates and clocks are testable in isolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    /// Immediate caller of the operation
    pub caller: AccountId,
    /// Ultimate requester (origin of the submission)
    pub origin: AccountId,
    /// Origin's base-currency balance on the network
    pub origin_native_balance: Decimal,
    /// Inclusion-priority price the requester bid
    pub fee_price: Decimal,
    pub now: DateTime<Utc>,
}

impl CallContext {
    /// Context where the caller is also the origin.
    pub fn direct(
        caller: AccountId,
        origin_native_balance: Decimal,
        fee_price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            origin: caller.clone(),
            caller,
            origin_native_balance,
            fee_price,
            now,
        }
    }
}
