use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::aggregator::{seeded_state, Aggregator};
use crate::config::AppConfig;
use crate::domain::{AccountId, CallContext, CommitmentToken, TradeRequest};
use crate::error::{Result, SluiceError};
use crate::price::ManualOracle;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(version = "0.1.0")]
#[command(about = "Split-route swap aggregator: quote and execute across vaults, bonding curve and fallback", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus $SLUICE_ENV overrides)
    #[arg(short, long, default_value = "config", env = "SLUICE_CONFIG_DIR")]
    pub config_dir: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate configuration and report every problem
    CheckConfig,
    /// Print the effective configuration as TOML
    ShowConfig,
    /// Build a route plan against the seeded ledger
    Quote {
        /// Input amount to spend
        #[arg(short, long)]
        amount: Decimal,
    },
    /// Quote and execute against the seeded ledger
    Execute {
        /// Input amount to spend
        #[arg(short, long)]
        amount: Decimal,
        /// Minimum total output to accept
        #[arg(long)]
        min_output: Decimal,
        /// Nonce for the single-use commitment token
        #[arg(long)]
        nonce: Option<u64>,
        /// Seconds until the request expires
        #[arg(long, default_value = "60")]
        deadline_secs: i64,
    },
}

/// Load from `config_dir`, or fall back to the built-in configuration when
/// the directory has no `default.toml`
pub fn load_config(config_dir: &str) -> Result<AppConfig> {
    if Path::new(config_dir).join("default.toml").exists() {
        Ok(AppConfig::load_from(config_dir)?)
    } else {
        warn!(
            "No default.toml in {}, using built-in configuration",
            config_dir
        );
        Ok(AppConfig::default_config())
    }
}

pub fn check_config(config: &AppConfig) -> Result<()> {
    match config.validate() {
        Ok(()) => {
            println!("\x1b[32m✓ Configuration valid\x1b[0m");
            println!(
                "  pair: {} -> {}, {} seed vault(s)",
                config.router.input_asset,
                config.router.output_asset,
                config.seed.vaults.len()
            );
            Ok(())
        }
        Err(errors) => {
            println!("\x1b[31m✗ Configuration has {} problem(s):\x1b[0m", errors.len());
            for e in &errors {
                println!("  - {}", e);
            }
            Err(SluiceError::Validation(errors.join("; ")))
        }
    }
}

pub fn show_config(config: &AppConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| SluiceError::Internal(format!("cannot render config: {}", e)))?;
    println!("{}", rendered);
    Ok(())
}

/// In-memory aggregator over the `[seed]` ledger with a fixed oracle price
pub fn seeded_aggregator(config: &AppConfig) -> Result<Aggregator> {
    let now = Utc::now();
    let oracle = Arc::new(ManualOracle::new(
        config.price_feed.oracle.as_str(),
        config.seed.oracle_price,
        now,
    ));
    let state = seeded_state(config, now)?;
    Ok(Aggregator::new(config, oracle, state))
}

fn seed_request(
    aggregator: &Aggregator,
    config: &AppConfig,
    amount: Decimal,
    min_output: Decimal,
    deadline_secs: i64,
) -> TradeRequest {
    aggregator.request(
        AccountId::new(config.seed.trader.as_str()),
        amount,
        min_output,
        Utc::now() + Duration::seconds(deadline_secs),
    )
}

pub async fn run_quote(config: &AppConfig, amount: Decimal) -> Result<()> {
    let aggregator = seeded_aggregator(config)?;
    let request = seed_request(&aggregator, config, amount, Decimal::ZERO, 60);

    let plan = aggregator.quote(&request, Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    println!("fingerprint: {}", plan.fingerprint()?);
    Ok(())
}

pub async fn run_execute(
    config: &AppConfig,
    amount: Decimal,
    min_output: Decimal,
    nonce: Option<u64>,
    deadline_secs: i64,
) -> Result<()> {
    let aggregator = seeded_aggregator(config)?;
    let trader = AccountId::new(config.seed.trader.as_str());
    let mut request = seed_request(&aggregator, config, amount, min_output, deadline_secs);
    if let Some(nonce) = nonce {
        request = request.with_commitment(CommitmentToken::derive(&trader, nonce));
    }

    let plan = aggregator.quote(&request, Utc::now()).await?;
    info!(
        "Plan: {} legs, expected output {} (savings {})",
        plan.legs.len(),
        plan.total_output,
        plan.savings
    );

    let ctx = CallContext::direct(
        trader,
        config.seed.trader_native_balance,
        config.seed.fee_price,
        Utc::now(),
    );
    let report = aggregator.execute(&request, &plan, &ctx).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("{}", serde_json::to_string_pretty(&aggregator.stats().await)?);
    Ok(())
}
