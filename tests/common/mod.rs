#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use sluice::aggregator::seeded_state;
use sluice::config::{AppConfig, SeedVault};
use sluice::{
    AccountId, Aggregator, AssetId, CallContext, LedgerState, ManualOracle, TradeRequest,
};

pub const TRADER: &str = "trader";
pub const ADMIN: &str = "admin";
pub const ESCROW: &str = "sluice-escrow";

pub fn usdc() -> AssetId {
    AssetId::new("USDC")
}

pub fn weth() -> AssetId {
    AssetId::new("WETH")
}

pub fn trader() -> AccountId {
    AccountId::new(TRADER)
}

pub fn owner(i: usize) -> AccountId {
    AccountId::new(format!("owner-{i}"))
}

/// Vault seed with 50% utilization and a 1000 WETH cap
pub fn vault(i: usize, fee_bps: u32, deposit: Decimal) -> SeedVault {
    SeedVault {
        owner: owner(i).to_string(),
        fee_bps,
        min_acceptable_price: dec!(1000),
        max_utilization_bps: 5000,
        max_liquidity: dec!(1000),
        deposit,
    }
}

/// Default configuration with the given vaults. Fallback estimate is 80 bps
/// (30 fee + 50 slippage) up to 50k input.
pub fn config_with(vaults: Vec<SeedVault>) -> AppConfig {
    let mut config = AppConfig::default_config();
    config.seed.vaults = vaults;
    config
}

pub struct Fixture {
    pub aggregator: Aggregator,
    pub oracle: Arc<ManualOracle>,
    pub config: AppConfig,
    pub now: DateTime<Utc>,
}

impl Fixture {
    pub fn new(config: AppConfig) -> Self {
        let now = Utc::now();
        let state = seeded_state(&config, now).expect("seed state");
        Self::with_state(config, state, now)
    }

    pub fn with_state(config: AppConfig, state: LedgerState, now: DateTime<Utc>) -> Self {
        let oracle = Arc::new(ManualOracle::new("manual", dec!(2500), now));
        let aggregator = Aggregator::new(&config, oracle.clone(), state);
        Self {
            aggregator,
            oracle,
            config,
            now,
        }
    }

    pub fn request(&self, amount: Decimal, min_output: Decimal) -> TradeRequest {
        self.aggregator.request(
            trader(),
            amount,
            min_output,
            self.now + Duration::minutes(5),
        )
    }

    pub fn trader_ctx(&self) -> CallContext {
        CallContext::direct(trader(), dec!(1), dec!(30), self.now)
    }

    pub fn admin_ctx(&self) -> CallContext {
        CallContext::direct(AccountId::new(ADMIN), dec!(1), dec!(30), self.now)
    }

    pub fn owner_ctx(&self, i: usize) -> CallContext {
        CallContext::direct(owner(i), dec!(1), dec!(30), self.now)
    }

    pub async fn trader_balances(&self) -> (Decimal, Decimal) {
        (
            self.aggregator.balance(&trader(), &usdc()).await,
            self.aggregator.balance(&trader(), &weth()).await,
        )
    }
}
