use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::{AccountId, AssetId, EventRecord, TradingPair, Vault, VaultId};
use crate::price::TwapTracker;
use crate::safety::{CommitmentRegistry, DailyVolumeCounter};
use crate::sources::{BondingCurve, FallbackPool};

/// Administrator-controlled runtime parameters.
///
/// Read at the top of every public operation; changed only through the admin
/// console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminParams {
    pub admin: AccountId,
    /// Only this identity may settle vault fills
    pub engine_identity: AccountId,
    /// Holds pulled trade input while a trade fills
    pub escrow: AccountId,
    pub halted: bool,
    /// Zero disables the ceiling
    pub fee_price_ceiling: Decimal,
}

/// Aggregate counters, updated only when a trade commits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterStats {
    pub trade_count: u64,
    pub total_input: Decimal,
    pub total_output: Decimal,
    pub total_savings: Decimal,
}

/// Everything the router's units of work read and write
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerState {
    pub pair: TradingPair,
    pub admin: AdminParams,
    pub(crate) balances: HashMap<(AccountId, AssetId), Decimal>,
    pub(crate) vaults: BTreeMap<VaultId, Vault>,
    pub(crate) next_vault_id: u64,
    pub(crate) bonding_curve: BondingCurve,
    pub(crate) fallback_pool: FallbackPool,
    pub(crate) commitments: CommitmentRegistry,
    pub(crate) volume: DailyVolumeCounter,
    pub(crate) twap: TwapTracker,
    pub(crate) stats: RouterStats,
    pub(crate) events: Vec<EventRecord>,
}

impl LedgerState {
    pub fn new(
        pair: TradingPair,
        admin: AdminParams,
        volume: DailyVolumeCounter,
        twap: TwapTracker,
    ) -> Self {
        Self {
            pair,
            admin,
            balances: HashMap::new(),
            vaults: BTreeMap::new(),
            next_vault_id: 1,
            bonding_curve: BondingCurve::disabled(),
            fallback_pool: FallbackPool::new(Decimal::ZERO, Decimal::ZERO, 0),
            commitments: CommitmentRegistry::default(),
            volume,
            twap,
            stats: RouterStats::default(),
            events: Vec::new(),
        }
    }

    /// Genesis balance. Only for building initial state.
    pub fn with_balance(mut self, account: AccountId, asset: AssetId, amount: Decimal) -> Self {
        *self.balances.entry((account, asset)).or_insert(Decimal::ZERO) += amount;
        self
    }

    pub fn with_bonding_curve(mut self, curve: BondingCurve) -> Self {
        self.bonding_curve = curve;
        self
    }

    pub fn with_fallback_pool(mut self, pool: FallbackPool) -> Self {
        self.fallback_pool = pool;
        self
    }

    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> Decimal {
        self.balances
            .get(&(account.clone(), asset.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn vault(&self, id: VaultId) -> Option<&Vault> {
        self.vaults.get(&id)
    }

    pub fn vaults(&self) -> impl Iterator<Item = &Vault> {
        self.vaults.values()
    }

    /// Vaults eligible for routing
    pub fn listed_vaults(&self) -> impl Iterator<Item = &Vault> {
        self.vaults.values().filter(|v| v.listed)
    }

    pub fn bonding_curve(&self) -> &BondingCurve {
        &self.bonding_curve
    }

    pub fn fallback_pool(&self) -> &FallbackPool {
        &self.fallback_pool
    }

    pub fn commitments(&self) -> &CommitmentRegistry {
        &self.commitments
    }

    pub fn volume(&self) -> &DailyVolumeCounter {
        &self.volume
    }

    pub fn twap(&self) -> &TwapTracker {
        &self.twap
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn is_halted(&self) -> bool {
        self.admin.halted
    }

    pub(crate) fn append_event(&mut self, at: DateTime<Utc>, event: crate::domain::RouterEvent) {
        let seq = self.events.len() as u64 + 1;
        self.events.push(EventRecord { seq, at, event });
    }
}
