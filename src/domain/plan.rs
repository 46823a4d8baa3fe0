use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::VaultId;
use crate::error::Result;

/// The three fixed source kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    BondingCurve,
    Vault,
    Fallback,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BondingCurve => "bonding_curve",
            Self::Vault => "vault",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a liquidity source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum SourceId {
    BondingCurve,
    Vault(VaultId),
    Fallback,
}

impl SourceId {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::BondingCurve => SourceKind::BondingCurve,
            Self::Vault(_) => SourceKind::Vault,
            Self::Fallback => SourceKind::Fallback,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BondingCurve => write!(f, "bonding_curve"),
            Self::Vault(id) => write!(f, "{}", id),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// One leg of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceQuote {
    pub source: SourceId,
    pub kind: SourceKind,
    pub output_amount: Decimal,
    /// Input consumed by this leg, fee included
    pub input_cost: Decimal,
    /// Portion of `input_cost` that is fee
    pub fee_portion: Decimal,
}

impl SourceQuote {
    pub fn new(
        source: SourceId,
        output_amount: Decimal,
        input_cost: Decimal,
        fee_portion: Decimal,
    ) -> Self {
        Self {
            source,
            kind: source.kind(),
            output_amount,
            input_cost,
            fee_portion,
        }
    }
}

/// Proposed cross-source allocation, computed before execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub legs: Vec<SourceQuote>,
    pub total_output: Decimal,
    pub total_input: Decimal,
    /// Output of sending everything to the fallback market
    pub baseline_output: Decimal,
    /// `max(0, total_output - baseline_output)`
    pub savings: Decimal,
    /// Price sample the plan was computed against
    pub price: Decimal,
    pub price_observed_at: DateTime<Utc>,
}

impl RoutePlan {
    pub fn legs_of(&self, kind: SourceKind) -> impl Iterator<Item = &SourceQuote> {
        self.legs.iter().filter(move |leg| leg.kind == kind)
    }

    pub fn fallback_leg(&self) -> Option<&SourceQuote> {
        self.legs_of(SourceKind::Fallback).next()
    }

    /// SHA-256 of the plan's canonical JSON, hex encoded.
    ///
    /// Two plans computed from the same ledger state and price sample have the
    /// same fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn plan(output: Decimal) -> RoutePlan {
        RoutePlan {
            legs: vec![SourceQuote::new(
                SourceId::Vault(VaultId(1)),
                output,
                dec!(100),
                dec!(1),
            )],
            total_output: output,
            total_input: dec!(100),
            baseline_output: dec!(0.03),
            savings: Decimal::ZERO,
            price: dec!(2500),
            price_observed_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0)
                .unwrap_or_default(),
        }
    }

    #[test]
    fn test_fingerprint_stable_and_sensitive() {
        let a = plan(dec!(0.04));
        let b = plan(dec!(0.04));
        let c = plan(dec!(0.041));

        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    #[test]
    fn test_source_kind_mapping() {
        assert_eq!(SourceId::Vault(VaultId(3)).kind(), SourceKind::Vault);
        assert_eq!(SourceId::Fallback.to_string(), "fallback");
        assert_eq!(SourceId::Vault(VaultId(3)).to_string(), "vault-3");
    }
}
