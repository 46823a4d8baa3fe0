//! Router events
//!
//! Append-only audit trail of trades, per-source skips/failures and every
//! privileged action. Events raised inside a trade are only appended when the
//! trade commits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, SourceId, VaultId, VaultParams};

/// Per-leg breakdown carried by `TradeExecuted`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegFill {
    pub source: SourceId,
    pub input_spent: Decimal,
    pub output_received: Decimal,
    pub fee_paid: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouterEvent {
    TradeExecuted {
        trade_id: Uuid,
        trader: AccountId,
        input_amount: Decimal,
        output_amount: Decimal,
        refunded: Decimal,
        legs: Vec<LegFill>,
        savings: Decimal,
    },
    SourceSkipped {
        trade_id: Uuid,
        source: SourceId,
        reason: String,
        expected_output: Decimal,
        live_capacity: Decimal,
    },
    SourceFailed {
        trade_id: Uuid,
        source: SourceId,
        reason: String,
    },
    VaultRegistered {
        vault: VaultId,
        owner: AccountId,
        params: VaultParams,
    },
    VaultRemoved {
        vault: VaultId,
    },
    VaultDeposit {
        vault: VaultId,
        amount: Decimal,
        balance: Decimal,
    },
    VaultWithdrawal {
        vault: VaultId,
        amount: Decimal,
        balance: Decimal,
    },
    VaultParametersUpdated {
        vault: VaultId,
        params: VaultParams,
    },
    HaltChanged {
        halted: bool,
        by: AccountId,
    },
    VolumeCapChanged {
        limit: Decimal,
        by: AccountId,
    },
    FeePriceCeilingChanged {
        ceiling: Decimal,
        by: AccountId,
    },
    OracleChanged {
        oracle: String,
        by: AccountId,
    },
    BondingCurveStatusChanged {
        graduated: bool,
        by: AccountId,
    },
}

impl RouterEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            RouterEvent::TradeExecuted { .. } => "trade_executed",
            RouterEvent::SourceSkipped { .. } => "source_skipped",
            RouterEvent::SourceFailed { .. } => "source_failed",
            RouterEvent::VaultRegistered { .. } => "vault_registered",
            RouterEvent::VaultRemoved { .. } => "vault_removed",
            RouterEvent::VaultDeposit { .. } => "vault_deposit",
            RouterEvent::VaultWithdrawal { .. } => "vault_withdrawal",
            RouterEvent::VaultParametersUpdated { .. } => "vault_parameters_updated",
            RouterEvent::HaltChanged { .. } => "halt_changed",
            RouterEvent::VolumeCapChanged { .. } => "volume_cap_changed",
            RouterEvent::FeePriceCeilingChanged { .. } => "fee_price_ceiling_changed",
            RouterEvent::OracleChanged { .. } => "oracle_changed",
            RouterEvent::BondingCurveStatusChanged { .. } => "bonding_curve_status_changed",
        }
    }
}

/// A committed event in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: RouterEvent,
}
