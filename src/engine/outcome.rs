use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ExecutionState, LegFill, SourceId};
use crate::safety::PriceDecision;
use crate::sources::FillReceipt;

/// What happened to one plan leg (or the final sweep) during Filling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FillOutcome {
    Filled(FillReceipt),
    /// Live capacity drifted beyond the request's tolerance
    Skipped {
        source: SourceId,
        reason: String,
        expected_output: Decimal,
        live_capacity: Decimal,
    },
    /// The fill was attempted and rolled back
    Failed { source: SourceId, reason: String },
}

impl FillOutcome {
    pub fn source(&self) -> SourceId {
        match self {
            FillOutcome::Filled(receipt) => receipt.source,
            FillOutcome::Skipped { source, .. } | FillOutcome::Failed { source, .. } => *source,
        }
    }

    pub fn receipt(&self) -> Option<&FillReceipt> {
        match self {
            FillOutcome::Filled(receipt) => Some(receipt),
            _ => None,
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, FillOutcome::Filled(_))
    }
}

impl From<&FillReceipt> for LegFill {
    fn from(receipt: &FillReceipt) -> Self {
        LegFill {
            source: receipt.source,
            input_spent: receipt.input_spent,
            output_received: receipt.output_received,
            fee_paid: receipt.fee_paid,
        }
    }
}

/// Result of a settled execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub trade_id: Uuid,
    pub state: ExecutionState,
    pub input_amount: Decimal,
    /// Total output credited to the trader
    pub actual_output: Decimal,
    /// Input returned to the trader after a failed fallback sweep
    pub refunded: Decimal,
    /// Output above the all-fallback baseline
    pub savings: Decimal,
    pub price: PriceDecision,
    pub outcomes: Vec<FillOutcome>,
}

impl ExecutionReport {
    /// Input actually spent across all filled legs
    pub fn input_spent(&self) -> Decimal {
        self.outcomes
            .iter()
            .filter_map(FillOutcome::receipt)
            .map(|r| r.input_spent)
            .sum()
    }

    pub fn filled(&self) -> impl Iterator<Item = &FillReceipt> {
        self.outcomes.iter().filter_map(FillOutcome::receipt)
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FillOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FillOutcome::Failed { .. }))
            .count()
    }
}
