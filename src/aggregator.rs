//! Aggregator
//!
//! Public surface of the router: quoting, execution, the vault owner console
//! and the administrative console, all over one shared ledger.
//!
//! The ledger sits behind a single async mutex. `execute` holds it for the
//! whole unit of work, which is what serializes trades against the same
//! vaults, volume counter and commitment set. `quote` fetches its price
//! without the lock and holds it only while computing the plan.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::config::AppConfig;
use crate::domain::{
    AccountId, AssetId, CallContext, EventRecord, RoutePlan, RouterEvent, TradeRequest,
    TradingPair, Vault, VaultId, VaultParams,
};
use crate::engine::{EngineConfig, ExecutionEngine, ExecutionReport};
use crate::error::{Result, SluiceError};
use crate::ledger::{AdminParams, LedgerState, LedgerTx, RouterStats};
use crate::price::{PriceFeed, PriceOracle, PriceSample, TwapTracker};
use crate::routing::RouteOptimizer;
use crate::safety::{DailyVolumeCounter, SafetyLayer};
use crate::sources::{BondingCurve, FallbackPool};

pub struct Aggregator {
    ledger: Arc<Mutex<LedgerState>>,
    feed: RwLock<PriceFeed>,
    optimizer: RouteOptimizer,
    engine: ExecutionEngine,
    default_drift_bps: u32,
}

impl Aggregator {
    /// Build an aggregator over `state` using the limits in `config`
    pub fn new(config: &AppConfig, oracle: Arc<dyn PriceOracle>, state: LedgerState) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(state)),
            feed: RwLock::new(PriceFeed::new(oracle, config.price_feed.max_staleness_secs)),
            optimizer: RouteOptimizer::new(config.fallback.estimator()),
            engine: ExecutionEngine::new(
                EngineConfig::from_app(config),
                SafetyLayer::new(config.safety.clone()),
            ),
            default_drift_bps: config.router.default_drift_bps,
        }
    }

    /// Validate `config` and build an aggregator with an empty ledger
    pub fn from_config(
        config: &AppConfig,
        oracle: Arc<dyn PriceOracle>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let state = initial_state(config, now)?;
        Ok(Self::new(config, oracle, state))
    }

    /// Request for `trader` with the configured default drift tolerance
    pub fn request(
        &self,
        trader: AccountId,
        input_amount: Decimal,
        min_output: Decimal,
        deadline: DateTime<Utc>,
    ) -> TradeRequest {
        TradeRequest::new(trader, input_amount, min_output, deadline)
            .with_drift_tolerance(self.default_drift_bps)
    }

    // ==================== Trading ====================

    /// Read-only plan for `request`. Works while halted.
    pub async fn quote(&self, request: &TradeRequest, now: DateTime<Utc>) -> Result<RoutePlan> {
        let sample = self.feed.read().await.get_price(now).await?;
        let state = self.ledger.lock().await;
        self.optimizer.plan(request.input_amount, &state, &sample)
    }

    pub async fn execute(
        &self,
        request: &TradeRequest,
        plan: &RoutePlan,
        ctx: &CallContext,
    ) -> Result<ExecutionReport> {
        let feed = self.feed.read().await.clone();
        let mut state = self.ledger.lock().await;
        self.engine
            .execute(&feed, &mut state, request, plan, ctx)
            .await
    }

    /// Fetch the current price and add it to the TWAP window
    pub async fn record_price(&self, now: DateTime<Utc>) -> Result<PriceSample> {
        let sample = self.feed.read().await.get_price(now).await?;
        let mut state = self.ledger.lock().await;
        let mut tx = LedgerTx::begin(&mut state, now);
        tx.twap_mut().record(sample);
        tx.commit();
        Ok(sample)
    }

    // ==================== Vault owner console ====================

    pub async fn deposit(&self, ctx: &CallContext, vault: VaultId, amount: Decimal) -> Result<Decimal> {
        let mut state = self.ledger.lock().await;
        let mut tx = LedgerTx::begin(&mut state, ctx.now);
        let balance = tx.deposit_vault(&ctx.caller, vault, amount)?;
        tx.commit();
        Ok(balance)
    }

    /// Allowed while halted and after the vault is removed from routing
    pub async fn withdraw(&self, ctx: &CallContext, vault: VaultId, amount: Decimal) -> Result<Decimal> {
        let mut state = self.ledger.lock().await;
        let mut tx = LedgerTx::begin(&mut state, ctx.now);
        let balance = tx.withdraw_vault(&ctx.caller, vault, amount)?;
        tx.commit();
        Ok(balance)
    }

    pub async fn update_vault_params(
        &self,
        ctx: &CallContext,
        vault: VaultId,
        params: VaultParams,
    ) -> Result<()> {
        let mut state = self.ledger.lock().await;
        let mut tx = LedgerTx::begin(&mut state, ctx.now);
        tx.update_vault_params(&ctx.caller, vault, params)?;
        tx.commit();
        Ok(())
    }

    // ==================== Administrative console ====================

    pub async fn register_vault(
        &self,
        ctx: &CallContext,
        owner: AccountId,
        params: VaultParams,
    ) -> Result<VaultId> {
        let mut state = self.ledger.lock().await;
        require_admin(&state, ctx)?;
        let mut tx = LedgerTx::begin(&mut state, ctx.now);
        let id = tx.register_vault(owner.clone(), params)?;
        tx.commit();
        info!("{} registered {} for {}", ctx.caller, id, owner);
        Ok(id)
    }

    /// Remove a vault from routing. Its funds stay with the owner.
    pub async fn remove_vault(&self, ctx: &CallContext, vault: VaultId) -> Result<()> {
        let mut state = self.ledger.lock().await;
        require_admin(&state, ctx)?;
        let mut tx = LedgerTx::begin(&mut state, ctx.now);
        tx.delist_vault(vault)?;
        tx.commit();
        info!("{} removed {} from routing", ctx.caller, vault);
        Ok(())
    }

    /// Point the price feed at a different oracle
    pub async fn set_oracle(&self, ctx: &CallContext, oracle: Arc<dyn PriceOracle>) -> Result<()> {
        let mut state = self.ledger.lock().await;
        require_admin(&state, ctx)?;

        let name = oracle.name();
        let mut feed = self.feed.write().await;
        *feed = feed.with_oracle(oracle);

        let mut tx = LedgerTx::begin(&mut state, ctx.now);
        tx.emit(RouterEvent::OracleChanged {
            oracle: name.clone(),
            by: ctx.caller.clone(),
        });
        tx.commit();
        info!("{} switched price oracle to {}", ctx.caller, name);
        Ok(())
    }

    /// Halting blocks execution only; quoting and withdrawals keep working
    pub async fn set_halted(&self, ctx: &CallContext, halted: bool) -> Result<()> {
        let mut state = self.ledger.lock().await;
        require_admin(&state, ctx)?;
        let mut tx = LedgerTx::begin(&mut state, ctx.now);
        tx.admin_mut().halted = halted;
        tx.emit(RouterEvent::HaltChanged {
            halted,
            by: ctx.caller.clone(),
        });
        tx.commit();
        info!("{} set halted = {}", ctx.caller, halted);
        Ok(())
    }

    /// Zero disables the cap
    pub async fn set_volume_cap(&self, ctx: &CallContext, limit: Decimal) -> Result<()> {
        if limit < Decimal::ZERO {
            return Err(SluiceError::Validation(format!(
                "volume cap cannot be negative: {}",
                limit
            )));
        }
        let mut state = self.ledger.lock().await;
        require_admin(&state, ctx)?;
        let mut tx = LedgerTx::begin(&mut state, ctx.now);
        tx.volume_mut().limit = limit;
        tx.emit(RouterEvent::VolumeCapChanged {
            limit,
            by: ctx.caller.clone(),
        });
        tx.commit();
        info!("{} set daily volume cap to {}", ctx.caller, limit);
        Ok(())
    }

    /// Zero disables the ceiling
    pub async fn set_fee_price_ceiling(&self, ctx: &CallContext, ceiling: Decimal) -> Result<()> {
        if ceiling < Decimal::ZERO {
            return Err(SluiceError::Validation(format!(
                "fee price ceiling cannot be negative: {}",
                ceiling
            )));
        }
        let mut state = self.ledger.lock().await;
        require_admin(&state, ctx)?;
        let mut tx = LedgerTx::begin(&mut state, ctx.now);
        tx.admin_mut().fee_price_ceiling = ceiling;
        tx.emit(RouterEvent::FeePriceCeilingChanged {
            ceiling,
            by: ctx.caller.clone(),
        });
        tx.commit();
        info!("{} set fee price ceiling to {}", ctx.caller, ceiling);
        Ok(())
    }

    pub async fn set_bonding_curve_graduated(&self, ctx: &CallContext, graduated: bool) -> Result<()> {
        let mut state = self.ledger.lock().await;
        require_admin(&state, ctx)?;
        let mut tx = LedgerTx::begin(&mut state, ctx.now);
        tx.bonding_curve_mut().graduated = graduated;
        tx.emit(RouterEvent::BondingCurveStatusChanged {
            graduated,
            by: ctx.caller.clone(),
        });
        tx.commit();
        info!("{} set bonding curve graduated = {}", ctx.caller, graduated);
        Ok(())
    }

    // ==================== Reads ====================

    pub async fn stats(&self) -> RouterStats {
        self.ledger.lock().await.stats().clone()
    }

    pub async fn events(&self) -> Vec<EventRecord> {
        self.ledger.lock().await.events().to_vec()
    }

    pub async fn vault(&self, id: VaultId) -> Option<Vault> {
        self.ledger.lock().await.vault(id).cloned()
    }

    pub async fn balance(&self, account: &AccountId, asset: &AssetId) -> Decimal {
        self.ledger.lock().await.balance(account, asset)
    }

    pub async fn is_halted(&self) -> bool {
        self.ledger.lock().await.is_halted()
    }

    pub async fn oracle_name(&self) -> String {
        self.feed.read().await.oracle_name()
    }

    /// Copy of the full ledger state
    pub async fn snapshot(&self) -> LedgerState {
        self.ledger.lock().await.clone()
    }

    pub fn ledger(&self) -> Arc<Mutex<LedgerState>> {
        Arc::clone(&self.ledger)
    }
}

fn require_admin(state: &LedgerState, ctx: &CallContext) -> Result<()> {
    if ctx.caller != state.admin.admin {
        return Err(SluiceError::Unauthorized(format!(
            "{} is not the administrator",
            ctx.caller
        )));
    }
    Ok(())
}

/// Empty ledger for the pair, identities and limits in `config`
pub fn initial_state(config: &AppConfig, now: DateTime<Utc>) -> Result<LedgerState> {
    config
        .validate()
        .map_err(|errors| SluiceError::Validation(errors.join("; ")))?;

    let pair = TradingPair {
        input: AssetId::new(config.router.input_asset.as_str()),
        output: AssetId::new(config.router.output_asset.as_str()),
    };
    let admin = AdminParams {
        admin: AccountId::new(config.router.admin.as_str()),
        engine_identity: AccountId::new(config.router.engine_identity.as_str()),
        escrow: AccountId::new(config.router.escrow.as_str()),
        halted: false,
        fee_price_ceiling: config.safety.fee_price_ceiling,
    };

    let mut state = LedgerState::new(
        pair,
        admin,
        DailyVolumeCounter::new(config.safety.daily_volume_cap, now),
        TwapTracker::new(config.price_feed.twap_window_secs),
    )
    .with_fallback_pool(FallbackPool::new(
        config.seed.fallback_reserve_input,
        config.seed.fallback_reserve_output,
        config.fallback.fee_tier_bps,
    ));

    if config.bonding_curve.enabled {
        let curve = BondingCurve::new(
            config.bonding_curve.virtual_input,
            config.bonding_curve.virtual_output,
            config.bonding_curve.real_output,
        );
        curve.validate()?;
        state = state.with_bonding_curve(curve);
    }

    Ok(state)
}

/// `initial_state` plus the vaults and trader balances in `[seed]`
pub fn seeded_state(config: &AppConfig, now: DateTime<Utc>) -> Result<LedgerState> {
    let seed = &config.seed;
    let mut state = initial_state(config, now)?;
    let input_asset = state.pair.input.clone();
    let output_asset = state.pair.output.clone();

    if !seed.trader.is_empty() {
        state = state.with_balance(
            AccountId::new(seed.trader.as_str()),
            input_asset,
            seed.trader_input_balance,
        );
    }
    for vault in &seed.vaults {
        state = state.with_balance(
            AccountId::new(vault.owner.as_str()),
            output_asset.clone(),
            vault.deposit,
        );
    }

    {
        let mut tx = LedgerTx::begin(&mut state, now);
        for vault in &seed.vaults {
            let owner = AccountId::new(vault.owner.as_str());
            let id = tx.register_vault(
                owner.clone(),
                VaultParams {
                    fee_bps: vault.fee_bps,
                    min_acceptable_price: vault.min_acceptable_price,
                    max_utilization_bps: vault.max_utilization_bps,
                    max_liquidity: vault.max_liquidity,
                },
            )?;
            if vault.deposit > Decimal::ZERO {
                tx.deposit_vault(&owner, id, vault.deposit)?;
            }
        }
        tx.commit();
    }

    info!(
        "Seeded ledger: {} vaults, fallback reserves {}/{}",
        seed.vaults.len(),
        seed.fallback_reserve_input,
        seed.fallback_reserve_output
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::ManualOracle;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn aggregator(now: DateTime<Utc>) -> (Aggregator, AppConfig) {
        let config = AppConfig::default_config();
        let oracle = Arc::new(ManualOracle::new("manual", dec!(2500), now));
        let state = seeded_state(&config, now).unwrap();
        (Aggregator::new(&config, oracle, state), config)
    }

    fn admin_ctx(now: DateTime<Utc>) -> CallContext {
        CallContext::direct(AccountId::new("admin"), dec!(1), dec!(1), now)
    }

    #[tokio::test]
    async fn test_seeded_state_registers_vaults() {
        let now = Utc::now();
        let (agg, _) = aggregator(now);
        let vault = agg.vault(VaultId(1)).await.unwrap();
        assert_eq!(vault.available_liquidity, dec!(20));
        assert_eq!(vault.fee_bps(), 10);
        assert!(agg.vault(VaultId(2)).await.is_some());
    }

    #[tokio::test]
    async fn test_admin_console_requires_admin() {
        let now = Utc::now();
        let (agg, _) = aggregator(now);
        let stranger = CallContext::direct(AccountId::new("stranger"), dec!(1), dec!(1), now);

        assert!(matches!(
            agg.set_halted(&stranger, true).await,
            Err(SluiceError::Unauthorized(_))
        ));
        agg.set_halted(&admin_ctx(now), true).await.unwrap();
        assert!(agg.is_halted().await);

        let events = agg.events().await;
        assert_eq!(
            events.last().map(|e| e.event.event_type()),
            Some("halt_changed")
        );
    }

    #[tokio::test]
    async fn test_quote_works_while_halted() {
        let now = Utc::now();
        let (agg, _) = aggregator(now);
        agg.set_halted(&admin_ctx(now), true).await.unwrap();

        let request = agg.request(
            AccountId::new("trader"),
            dec!(10000),
            dec!(3),
            now + Duration::minutes(5),
        );
        assert!(agg.quote(&request, now).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_oracle_swaps_feed_and_audits() {
        let now = Utc::now();
        let (agg, _) = aggregator(now);
        let replacement = Arc::new(ManualOracle::new("backup", dec!(2510), now));

        agg.set_oracle(&admin_ctx(now), replacement).await.unwrap();
        assert_eq!(agg.oracle_name().await, "backup");
        assert!(agg.events().await.iter().any(|e| matches!(
            &e.event,
            RouterEvent::OracleChanged { oracle, .. } if oracle == "backup"
        )));
    }

    #[tokio::test]
    async fn test_volume_cap_and_ceiling_validation() {
        let now = Utc::now();
        let (agg, _) = aggregator(now);
        let ctx = admin_ctx(now);

        assert!(agg.set_volume_cap(&ctx, dec!(-1)).await.is_err());
        agg.set_volume_cap(&ctx, dec!(500)).await.unwrap();
        agg.set_fee_price_ceiling(&ctx, dec!(5)).await.unwrap();

        let state = agg.snapshot().await;
        assert_eq!(state.volume().limit, dec!(500));
        assert_eq!(state.admin.fee_price_ceiling, dec!(5));
    }

    #[tokio::test]
    async fn test_record_price_feeds_twap() {
        let now = Utc::now();
        let (agg, _) = aggregator(now);
        agg.record_price(now).await.unwrap();
        assert_eq!(agg.snapshot().await.twap().len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = AppConfig::default_config();
        config.router.max_trade_size = dec!(1);
        assert!(matches!(
            initial_state(&config, Utc::now()),
            Err(SluiceError::Validation(_))
        ));
    }
}
