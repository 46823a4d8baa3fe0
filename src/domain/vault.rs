use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{apply_bps, AccountId};
use crate::error::VaultError;

/// Fee bounds for a vault, in bps
pub const MIN_VAULT_FEE_BPS: u32 = 1;
pub const MAX_VAULT_FEE_BPS: u32 = 100;

/// Upper bound on the share of a vault's balance one fill may take, in bps
pub const MAX_UTILIZATION_BPS: u32 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultId(pub u64);

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vault-{}", self.0)
    }
}

/// Owner-tunable vault parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultParams {
    /// Fee charged on top of cost, in bps (1..=100)
    pub fee_bps: u32,
    /// The vault quotes nothing below this price
    pub min_acceptable_price: Decimal,
    /// Max share of current balance per fill, in bps (<= 5000)
    pub max_utilization_bps: u32,
    /// Deposit cap on `available_liquidity`
    pub max_liquidity: Decimal,
}

impl VaultParams {
    pub fn validate(&self) -> Result<(), VaultError> {
        if !(MIN_VAULT_FEE_BPS..=MAX_VAULT_FEE_BPS).contains(&self.fee_bps) {
            return Err(VaultError::InvalidParameters(format!(
                "fee_bps {} outside [{}, {}]",
                self.fee_bps, MIN_VAULT_FEE_BPS, MAX_VAULT_FEE_BPS
            )));
        }
        if self.max_utilization_bps == 0 || self.max_utilization_bps > MAX_UTILIZATION_BPS {
            return Err(VaultError::InvalidParameters(format!(
                "max_utilization_bps {} outside (0, {}]",
                self.max_utilization_bps, MAX_UTILIZATION_BPS
            )));
        }
        if self.min_acceptable_price < Decimal::ZERO {
            return Err(VaultError::InvalidParameters(
                "min_acceptable_price cannot be negative".to_string(),
            ));
        }
        if self.max_liquidity <= Decimal::ZERO {
            return Err(VaultError::InvalidParameters(
                "max_liquidity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of quoting a vault for a desired output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultQuote {
    pub feasible_output: Decimal,
    pub cost: Decimal,
    pub fee: Decimal,
}

impl VaultQuote {
    pub const ZERO: VaultQuote = VaultQuote {
        feasible_output: Decimal::ZERO,
        cost: Decimal::ZERO,
        fee: Decimal::ZERO,
    };

    pub fn total_input(&self) -> Decimal {
        self.cost + self.fee
    }

    pub fn is_zero(&self) -> bool {
        self.feasible_output.is_zero()
    }
}

/// Independently owned single-asset liquidity reservoir
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub owner: AccountId,
    pub params: VaultParams,
    pub available_liquidity: Decimal,
    /// De-registered vaults keep their funds but are never routed to
    pub listed: bool,
    pub total_deposited: Decimal,
    pub fees_earned: Decimal,
    pub volume: Decimal,
    pub trade_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Vault {
    pub fn new(
        id: VaultId,
        owner: AccountId,
        params: VaultParams,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            params,
            available_liquidity: Decimal::ZERO,
            listed: true,
            total_deposited: Decimal::ZERO,
            fees_earned: Decimal::ZERO,
            volume: Decimal::ZERO,
            trade_count: 0,
            created_at,
        }
    }

    pub fn fee_bps(&self) -> u32 {
        self.params.fee_bps
    }

    /// Largest output one fill may take: `available * max_utilization_bps / 10_000`
    pub fn max_fill(&self) -> Decimal {
        apply_bps(self.available_liquidity, self.params.max_utilization_bps)
    }

    /// Quote `desired_output` at `price` (input units per output unit).
    pub fn quote(&self, desired_output: Decimal, price: Decimal) -> VaultQuote {
        if price < self.params.min_acceptable_price || desired_output <= Decimal::ZERO {
            return VaultQuote::ZERO;
        }

        let feasible_output = desired_output.min(self.max_fill());
        if feasible_output <= Decimal::ZERO {
            return VaultQuote::ZERO;
        }

        let cost = feasible_output * price;
        let fee = apply_bps(cost, self.params.fee_bps);
        VaultQuote {
            feasible_output,
            cost,
            fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params(fee_bps: u32) -> VaultParams {
        VaultParams {
            fee_bps,
            min_acceptable_price: dec!(2000),
            max_utilization_bps: 5_000,
            max_liquidity: dec!(1000),
        }
    }

    fn vault(liquidity: Decimal) -> Vault {
        let mut v = Vault::new(VaultId(1), AccountId::new("owner"), params(12), Utc::now());
        v.available_liquidity = liquidity;
        v
    }

    #[test]
    fn test_quote_within_utilization() {
        let v = vault(dec!(10));
        let q = v.quote(dec!(4), dec!(2500));
        assert_eq!(q.feasible_output, dec!(4));
        assert_eq!(q.cost, dec!(10000));
        assert_eq!(q.fee, dec!(12));
        assert_eq!(q.total_input(), dec!(10012));
    }

    #[test]
    fn test_quote_capped_by_utilization() {
        let v = vault(dec!(6));
        let q = v.quote(dec!(4), dec!(2500));
        // 50% of 6
        assert_eq!(q.feasible_output, dec!(3));
    }

    #[test]
    fn test_quote_below_min_price_is_zero() {
        let v = vault(dec!(10));
        assert!(v.quote(dec!(1), dec!(1999)).is_zero());
    }

    #[test]
    fn test_params_validation() {
        assert!(params(12).validate().is_ok());
        assert!(params(0).validate().is_err());
        assert!(params(101).validate().is_err());

        let mut p = params(12);
        p.max_utilization_bps = 5_001;
        assert!(p.validate().is_err());
    }
}
