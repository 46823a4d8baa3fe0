use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{MAX_UTILIZATION_BPS, MAX_VAULT_FEE_BPS, MIN_VAULT_FEE_BPS};
use crate::sources::{FallbackEstimator, SlippageTier};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub router: RouterConfig,
    pub price_feed: PriceFeedConfig,
    pub safety: SafetyConfig,
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub bonding_curve: BondingCurveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Initial state for the in-memory CLI deployment
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Asset the trader spends (e.g. "USDC")
    pub input_asset: String,
    /// Asset the trader receives (e.g. "WETH")
    pub output_asset: String,
    /// Smallest accepted trade, in input units
    pub min_trade_size: Decimal,
    /// Largest accepted trade, in input units
    pub max_trade_size: Decimal,
    /// Drift tolerance used when a request does not set one
    #[serde(default = "default_drift_bps")]
    pub default_drift_bps: u32,
    pub admin: String,
    /// Identity allowed to settle vault fills
    pub engine_identity: String,
    /// Account holding pulled input during a trade
    pub escrow: String,
}

fn default_drift_bps() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    /// Oracle name recorded in audit events
    pub oracle: String,
    /// Oldest usable sample, in seconds
    pub max_staleness_secs: i64,
    /// Smoothing window for the large-trade reference price
    #[serde(default = "default_twap_window")]
    pub twap_window_secs: i64,
}

fn default_twap_window() -> i64 {
    1800
}

/// What to do when a large trade's spot price strays from the TWAP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationPolicy {
    /// Route and settle at the TWAP instead
    Substitute,
    /// Refuse the trade
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Minimum base-currency balance the ultimate requester must hold
    pub min_standing_capital: Decimal,
    /// Inclusion-priority price ceiling (0 = disabled)
    #[serde(default)]
    pub fee_price_ceiling: Decimal,
    /// Rolling 24h volume ceiling in input units (0 = disabled)
    #[serde(default)]
    pub daily_volume_cap: Decimal,
    /// Trades at or above this input size get the TWAP check
    pub large_trade_threshold: Decimal,
    pub max_twap_deviation_bps: u32,
    #[serde(default = "default_deviation_policy")]
    pub deviation_policy: DeviationPolicy,
    /// How far the current price may have moved from the plan's price
    pub max_plan_deviation_bps: u32,
}

fn default_deviation_policy() -> DeviationPolicy {
    DeviationPolicy::Reject
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Fee tier of the fallback pool, in bps
    pub fee_tier_bps: u32,
    /// Slippage step function, sorted by `max_input`
    pub slippage_tiers: Vec<SlippageTier>,
}

impl FallbackConfig {
    pub fn estimator(&self) -> FallbackEstimator {
        FallbackEstimator::new(self.fee_tier_bps, self.slippage_tiers.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BondingCurveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub virtual_input: Decimal,
    #[serde(default)]
    pub virtual_output: Decimal,
    /// Output actually available for sale
    #[serde(default)]
    pub real_output: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// One vault created at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedVault {
    pub owner: String,
    pub fee_bps: u32,
    #[serde(default)]
    pub min_acceptable_price: Decimal,
    pub max_utilization_bps: u32,
    pub max_liquidity: Decimal,
    pub deposit: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Fixed price served by the manual oracle
    #[serde(default)]
    pub oracle_price: Decimal,
    #[serde(default)]
    pub fallback_reserve_input: Decimal,
    #[serde(default)]
    pub fallback_reserve_output: Decimal,
    #[serde(default)]
    pub trader: String,
    #[serde(default)]
    pub trader_input_balance: Decimal,
    /// Trader's base-currency balance, checked by the standing-capital gate
    #[serde(default)]
    pub trader_native_balance: Decimal,
    #[serde(default)]
    pub fee_price: Decimal,
    #[serde(default)]
    pub vaults: Vec<SeedVault>,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("router.default_drift_bps", 100)?
            .set_default("price_feed.twap_window_secs", 1800)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SLUICE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (SLUICE_SAFETY__DAILY_VOLUME_CAP, etc.)
            .add_source(
                Environment::with_prefix("SLUICE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config() -> Self {
        use rust_decimal_macros::dec;

        Self {
            router: RouterConfig {
                input_asset: "USDC".to_string(),
                output_asset: "WETH".to_string(),
                min_trade_size: dec!(10),
                max_trade_size: dec!(5000000),
                default_drift_bps: 100,
                admin: "admin".to_string(),
                engine_identity: "sluice-engine".to_string(),
                escrow: "sluice-escrow".to_string(),
            },
            price_feed: PriceFeedConfig {
                oracle: "manual".to_string(),
                max_staleness_secs: 3600,
                twap_window_secs: 1800,
            },
            safety: SafetyConfig {
                min_standing_capital: dec!(0.01),
                fee_price_ceiling: dec!(500),
                daily_volume_cap: dec!(50000000),
                large_trade_threshold: dec!(100000),
                max_twap_deviation_bps: 200,
                deviation_policy: DeviationPolicy::Reject,
                max_plan_deviation_bps: 50,
            },
            fallback: FallbackConfig {
                fee_tier_bps: 30,
                slippage_tiers: vec![
                    SlippageTier {
                        max_input: dec!(50000),
                        slippage_bps: 50,
                    },
                    SlippageTier {
                        max_input: dec!(250000),
                        slippage_bps: 120,
                    },
                    SlippageTier {
                        max_input: dec!(1000000),
                        slippage_bps: 250,
                    },
                ],
            },
            bonding_curve: BondingCurveConfig::default(),
            logging: LoggingConfig::default(),
            seed: SeedConfig {
                oracle_price: dec!(2500),
                fallback_reserve_input: dec!(250000000),
                fallback_reserve_output: dec!(100000),
                trader: "trader".to_string(),
                trader_input_balance: dec!(1000000),
                trader_native_balance: dec!(1),
                fee_price: dec!(30),
                vaults: vec![
                    SeedVault {
                        owner: "vault-owner-a".to_string(),
                        fee_bps: 10,
                        min_acceptable_price: dec!(1000),
                        max_utilization_bps: 5000,
                        max_liquidity: dec!(1000),
                        deposit: dec!(20),
                    },
                    SeedVault {
                        owner: "vault-owner-b".to_string(),
                        fee_bps: 15,
                        min_acceptable_price: dec!(1000),
                        max_utilization_bps: 5000,
                        max_liquidity: dec!(1000),
                        deposit: dec!(40),
                    },
                ],
            },
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Router
        if self.router.input_asset.is_empty() || self.router.output_asset.is_empty() {
            errors.push("input_asset and output_asset must be set".to_string());
        }
        if self.router.input_asset == self.router.output_asset {
            errors.push("input_asset and output_asset must differ".to_string());
        }
        if self.router.min_trade_size <= Decimal::ZERO {
            errors.push("min_trade_size must be positive".to_string());
        }
        if self.router.max_trade_size < self.router.min_trade_size {
            errors.push("max_trade_size must be at least min_trade_size".to_string());
        }
        if self.router.default_drift_bps > 10_000 {
            errors.push("default_drift_bps cannot exceed 10000".to_string());
        }
        if self.router.engine_identity.is_empty() || self.router.escrow.is_empty() {
            errors.push("engine_identity and escrow must be set".to_string());
        }
        if self.router.engine_identity == self.router.escrow {
            errors.push("engine_identity and escrow must be distinct accounts".to_string());
        }

        // Price feed
        if self.price_feed.max_staleness_secs <= 0 {
            errors.push("max_staleness_secs must be positive".to_string());
        }
        if self.price_feed.twap_window_secs <= 0 {
            errors.push("twap_window_secs must be positive".to_string());
        }

        // Safety
        if self.safety.min_standing_capital < Decimal::ZERO {
            errors.push("min_standing_capital cannot be negative".to_string());
        }
        if self.safety.fee_price_ceiling < Decimal::ZERO {
            errors.push("fee_price_ceiling cannot be negative (use 0 to disable)".to_string());
        }
        if self.safety.daily_volume_cap < Decimal::ZERO {
            errors.push("daily_volume_cap cannot be negative (use 0 to disable)".to_string());
        }
        if self.safety.max_twap_deviation_bps == 0 || self.safety.max_plan_deviation_bps == 0 {
            errors.push(
                "max_twap_deviation_bps and max_plan_deviation_bps must be positive".to_string(),
            );
        }

        // Fallback
        if let Err(e) = self.fallback.estimator().validate() {
            errors.push(e.to_string());
        }

        // Bonding curve
        if self.bonding_curve.enabled {
            let curve = &self.bonding_curve;
            if curve.virtual_input <= Decimal::ZERO || curve.virtual_output <= Decimal::ZERO {
                errors.push("bonding curve virtual reserves must be positive".to_string());
            }
            if curve.real_output <= Decimal::ZERO || curve.real_output >= curve.virtual_output {
                errors.push(
                    "bonding curve real_output must be positive and below virtual_output"
                        .to_string(),
                );
            }
        }

        // Seed vaults
        for (i, vault) in self.seed.vaults.iter().enumerate() {
            if vault.fee_bps < MIN_VAULT_FEE_BPS || vault.fee_bps > MAX_VAULT_FEE_BPS {
                errors.push(format!(
                    "seed vault {i}: fee_bps must be in [{MIN_VAULT_FEE_BPS}, {MAX_VAULT_FEE_BPS}]"
                ));
            }
            if vault.max_utilization_bps == 0 || vault.max_utilization_bps > MAX_UTILIZATION_BPS {
                errors.push(format!(
                    "seed vault {i}: max_utilization_bps must be in [1, {MAX_UTILIZATION_BPS}]"
                ));
            }
            if vault.deposit > vault.max_liquidity {
                errors.push(format!("seed vault {i}: deposit exceeds max_liquidity"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
