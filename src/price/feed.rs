use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::domain::deviation_bps;
use crate::error::{PriceError, Result};

/// Tolerated lead of an oracle timestamp over the local clock
pub const MAX_CLOCK_SKEW_SECS: i64 = 5;

/// Raw oracle reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRound {
    pub value: Decimal,
    pub observed_at: DateTime<Utc>,
    pub round_complete: bool,
}

/// A validated, usable price (input units per output unit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    pub value: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.observed_at).num_seconds()
    }
}

/// External price oracle service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Human-readable oracle address/name, used in audit events
    fn name(&self) -> String;

    async fn latest_round(&self) -> Result<OracleRound>;
}

/// Freshness/validity wrapper around an oracle. Read-only.
#[derive(Clone)]
pub struct PriceFeed {
    oracle: Arc<dyn PriceOracle>,
    max_staleness: Duration,
}

impl PriceFeed {
    pub fn new(oracle: Arc<dyn PriceOracle>, max_staleness_secs: i64) -> Self {
        Self {
            oracle,
            max_staleness: Duration::seconds(max_staleness_secs),
        }
    }

    pub fn oracle_name(&self) -> String {
        self.oracle.name()
    }

    pub fn max_staleness_secs(&self) -> i64 {
        self.max_staleness.num_seconds()
    }

    /// Same staleness bound, different oracle
    pub fn with_oracle(&self, oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            oracle,
            max_staleness: self.max_staleness,
        }
    }

    /// Fetch the current usable price. Fails closed on anything doubtful.
    pub async fn get_price(&self, now: DateTime<Utc>) -> Result<PriceSample> {
        let round = self.oracle.latest_round().await?;
        let sample = self.validate_round(&round, now)?;
        debug!(
            "Price {} observed at {} ({}s old)",
            sample.value,
            sample.observed_at,
            sample.age_secs(now)
        );
        Ok(sample)
    }

    fn validate_round(&self, round: &OracleRound, now: DateTime<Utc>) -> Result<PriceSample> {
        if !round.round_complete {
            warn!("Oracle round incomplete, refusing price");
            return Err(PriceError::InvalidPrice("incomplete oracle round".to_string()).into());
        }
        if round.value <= Decimal::ZERO {
            warn!("Oracle returned non-positive price {}", round.value);
            return Err(PriceError::InvalidPrice(format!(
                "non-positive reading {}",
                round.value
            ))
            .into());
        }

        let age = now - round.observed_at;
        if age < -Duration::seconds(MAX_CLOCK_SKEW_SECS) {
            warn!(
                "Oracle price timestamped {}s in the future, refusing",
                -age.num_seconds()
            );
            return Err(PriceError::InvalidPrice(format!(
                "observation time {} is ahead of now {}",
                round.observed_at, now
            ))
            .into());
        }
        if age > self.max_staleness {
            warn!(
                "Oracle price stale: {}s old (max {}s)",
                age.num_seconds(),
                self.max_staleness.num_seconds()
            );
            return Err(PriceError::StalePrice {
                age_secs: age.num_seconds(),
                max_staleness_secs: self.max_staleness.num_seconds(),
            }
            .into());
        }

        Ok(PriceSample {
            value: round.value,
            observed_at: round.observed_at,
        })
    }

    /// True iff `candidate` is within `max_deviation_bps` of the current price.
    pub async fn validate_against(
        &self,
        candidate: Decimal,
        max_deviation_bps: u32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let current = self.get_price(now).await?;
        Ok(within_bps(current.value, candidate, max_deviation_bps))
    }
}

/// `|candidate - reference| / reference <= max_bps`
pub fn within_bps(reference: Decimal, candidate: Decimal, max_bps: u32) -> bool {
    deviation_bps(reference, candidate) <= Decimal::from(max_bps)
}

/// Oracle whose reading is set by hand. Used for seeded deployments and tests.
pub struct ManualOracle {
    name: String,
    round: Mutex<OracleRound>,
}

impl ManualOracle {
    pub fn new(name: impl Into<String>, value: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            round: Mutex::new(OracleRound {
                value,
                observed_at,
                round_complete: true,
            }),
        }
    }

    pub fn set(&self, round: OracleRound) {
        if let Ok(mut guard) = self.round.lock() {
            *guard = round;
        }
    }

    pub fn set_price(&self, value: Decimal, observed_at: DateTime<Utc>) {
        self.set(OracleRound {
            value,
            observed_at,
            round_complete: true,
        });
    }
}

#[async_trait]
impl PriceOracle for ManualOracle {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn latest_round(&self) -> Result<OracleRound> {
        self.round
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| PriceError::OracleUnavailable("oracle state poisoned".to_string()).into())
    }
}
