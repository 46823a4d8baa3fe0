//! Journaled ledger transaction
//!
//! Every mutation goes through a `LedgerTx`, which records the prior value
//! before changing anything. `commit()` keeps the changes and appends buffered
//! events; dropping the transaction without committing replays the journal
//! backwards and leaves the state exactly as it was at `begin()`.
//! `savepoint()`/`rollback_to()` unwind a suffix of the journal, which is how a
//! single failed source fill is isolated from the rest of the trade.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use super::state::{AdminParams, LedgerState, RouterStats};
use crate::domain::{AccountId, AssetId, CommitmentToken, RouterEvent, Vault, VaultId};
use crate::error::{Result, SluiceError, VaultError};
use crate::price::TwapTracker;
use crate::safety::DailyVolumeCounter;
use crate::sources::{BondingCurve, FallbackPool};

enum Undo {
    /// `None` when the account had no entry for the asset
    Balance {
        key: (AccountId, AssetId),
        previous: Option<Decimal>,
    },
    Vault {
        id: VaultId,
        previous: Option<Box<Vault>>,
    },
    NextVaultId(u64),
    BondingCurve(Box<BondingCurve>),
    FallbackPool(Box<FallbackPool>),
    Commitment(CommitmentToken),
    Volume(DailyVolumeCounter),
    Twap(Box<TwapTracker>),
    Stats(RouterStats),
    Admin(Box<AdminParams>),
}

/// Position in a transaction that can be rolled back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint {
    journal_len: usize,
    events_len: usize,
}

pub struct LedgerTx<'a> {
    state: &'a mut LedgerState,
    journal: Vec<Undo>,
    pending_events: Vec<RouterEvent>,
    now: DateTime<Utc>,
    committed: bool,
}

impl<'a> LedgerTx<'a> {
    pub fn begin(state: &'a mut LedgerState, now: DateTime<Utc>) -> Self {
        Self {
            state,
            journal: Vec::new(),
            pending_events: Vec::new(),
            now,
            committed: false,
        }
    }

    pub fn state(&self) -> &LedgerState {
        self.state
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> Decimal {
        self.state.balance(account, asset)
    }

    fn set_balance(&mut self, account: &AccountId, asset: &AssetId, value: Decimal) {
        let key = (account.clone(), asset.clone());
        let previous = self.state.balances.get(&key).copied();
        self.journal.push(Undo::Balance {
            key: key.clone(),
            previous,
        });
        self.state.balances.insert(key, value);
    }

    pub fn credit(&mut self, account: &AccountId, asset: &AssetId, amount: Decimal) -> Result<()> {
        if amount < Decimal::ZERO {
            return Err(SluiceError::Validation(format!(
                "cannot credit negative amount {}",
                amount
            )));
        }
        let current = self.balance(account, asset);
        let updated = current.checked_add(amount).ok_or_else(|| {
            SluiceError::Validation(format!(
                "crediting {} to {} {} overflows",
                amount, account, asset
            ))
        })?;
        self.set_balance(account, asset, updated);
        Ok(())
    }

    pub fn debit(&mut self, account: &AccountId, asset: &AssetId, amount: Decimal) -> Result<()> {
        if amount < Decimal::ZERO {
            return Err(SluiceError::Validation(format!(
                "cannot debit negative amount {}",
                amount
            )));
        }
        let current = self.balance(account, asset);
        if current < amount {
            return Err(SluiceError::InsufficientBalance {
                account: account.to_string(),
                asset: asset.to_string(),
                required: amount,
                available: current,
            });
        }
        self.set_balance(account, asset, current - amount);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<()> {
        self.debit(from, asset, amount)?;
        self.credit(to, asset, amount)
    }

    pub(crate) fn vault_mut(&mut self, id: VaultId) -> std::result::Result<&mut Vault, VaultError> {
        let snapshot = self
            .state
            .vaults
            .get(&id)
            .cloned()
            .ok_or(VaultError::NotFound(id.0))?;
        self.journal.push(Undo::Vault {
            id,
            previous: Some(Box::new(snapshot)),
        });
        self.state.vaults.get_mut(&id).ok_or(VaultError::NotFound(id.0))
    }

    pub(crate) fn insert_vault(&mut self, vault: Vault) {
        let previous = self.state.vaults.get(&vault.id).cloned().map(Box::new);
        self.journal.push(Undo::Vault {
            id: vault.id,
            previous,
        });
        self.state.vaults.insert(vault.id, vault);
    }

    pub(crate) fn allocate_vault_id(&mut self) -> VaultId {
        let id = self.state.next_vault_id;
        self.journal.push(Undo::NextVaultId(id));
        self.state.next_vault_id = id + 1;
        VaultId(id)
    }

    pub(crate) fn bonding_curve_mut(&mut self) -> &mut BondingCurve {
        self.journal
            .push(Undo::BondingCurve(Box::new(self.state.bonding_curve.clone())));
        &mut self.state.bonding_curve
    }

    pub(crate) fn fallback_pool_mut(&mut self) -> &mut FallbackPool {
        self.journal
            .push(Undo::FallbackPool(Box::new(self.state.fallback_pool.clone())));
        &mut self.state.fallback_pool
    }

    /// Mark a commitment consumed. Returns false if it already was.
    pub fn consume_commitment(&mut self, token: &CommitmentToken) -> bool {
        if !self.state.commitments.consume(token.clone()) {
            return false;
        }
        self.journal.push(Undo::Commitment(token.clone()));
        true
    }

    pub(crate) fn volume_mut(&mut self) -> &mut DailyVolumeCounter {
        self.journal.push(Undo::Volume(self.state.volume.clone()));
        &mut self.state.volume
    }

    pub(crate) fn twap_mut(&mut self) -> &mut TwapTracker {
        self.journal.push(Undo::Twap(Box::new(self.state.twap.clone())));
        &mut self.state.twap
    }

    pub(crate) fn stats_mut(&mut self) -> &mut RouterStats {
        self.journal.push(Undo::Stats(self.state.stats.clone()));
        &mut self.state.stats
    }

    pub(crate) fn admin_mut(&mut self) -> &mut AdminParams {
        self.journal.push(Undo::Admin(Box::new(self.state.admin.clone())));
        &mut self.state.admin
    }

    /// Buffer an event; it reaches the log only if the transaction commits
    pub fn emit(&mut self, event: RouterEvent) {
        self.pending_events.push(event);
    }

    pub fn pending_events(&self) -> &[RouterEvent] {
        &self.pending_events
    }

    pub fn savepoint(&self) -> Savepoint {
        Savepoint {
            journal_len: self.journal.len(),
            events_len: self.pending_events.len(),
        }
    }

    /// Undo everything recorded after `savepoint`
    pub fn rollback_to(&mut self, savepoint: Savepoint) {
        while self.journal.len() > savepoint.journal_len {
            if let Some(entry) = self.journal.pop() {
                self.undo(entry);
            }
        }
        self.pending_events.truncate(savepoint.events_len);
    }

    /// Keep every change and append buffered events. Returns the number of
    /// events appended.
    pub fn commit(mut self) -> usize {
        let events = std::mem::take(&mut self.pending_events);
        let count = events.len();
        for event in events {
            self.state.append_event(self.now, event);
        }
        debug!(
            "Ledger transaction committed ({} journal entries, {} events)",
            self.journal.len(),
            count
        );
        self.journal.clear();
        self.committed = true;
        count
    }

    fn undo(&mut self, entry: Undo) {
        match entry {
            Undo::Balance { key, previous } => match previous {
                Some(value) => {
                    self.state.balances.insert(key, value);
                }
                None => {
                    self.state.balances.remove(&key);
                }
            },
            Undo::Vault { id, previous } => match previous {
                Some(vault) => {
                    self.state.vaults.insert(id, *vault);
                }
                None => {
                    self.state.vaults.remove(&id);
                }
            },
            Undo::NextVaultId(id) => self.state.next_vault_id = id,
            Undo::BondingCurve(curve) => self.state.bonding_curve = *curve,
            Undo::FallbackPool(pool) => self.state.fallback_pool = *pool,
            Undo::Commitment(token) => self.state.commitments.release(&token),
            Undo::Volume(volume) => self.state.volume = volume,
            Undo::Twap(twap) => self.state.twap = *twap,
            Undo::Stats(stats) => self.state.stats = stats,
            Undo::Admin(admin) => self.state.admin = *admin,
        }
    }
}

impl Drop for LedgerTx<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let entries = self.journal.len();
        self.rollback_to(Savepoint {
            journal_len: 0,
            events_len: 0,
        });
        if entries > 0 {
            debug!("Ledger transaction rolled back ({} journal entries)", entries);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradingPair;
    use rust_decimal_macros::dec;

    fn state() -> LedgerState {
        let now = Utc::now();
        LedgerState::new(
            TradingPair {
                input: AssetId::new("USDC"),
                output: AssetId::new("WETH"),
            },
            AdminParams {
                admin: AccountId::new("admin"),
                engine_identity: AccountId::new("engine"),
                escrow: AccountId::new("escrow"),
                halted: false,
                fee_price_ceiling: Decimal::ZERO,
            },
            DailyVolumeCounter::new(Decimal::ZERO, now),
            TwapTracker::new(600),
        )
        .with_balance(AccountId::new("alice"), AssetId::new("USDC"), dec!(100))
    }

    fn usdc() -> AssetId {
        AssetId::new("USDC")
    }

    #[test]
    fn test_commit_keeps_changes() {
        let mut state = state();
        let alice = AccountId::new("alice");
        let bob = AccountId::new("bob");

        let mut tx = LedgerTx::begin(&mut state, Utc::now());
        tx.transfer(&alice, &bob, &usdc(), dec!(40)).unwrap();
        tx.emit(RouterEvent::VaultRemoved { vault: VaultId(1) });
        assert_eq!(tx.commit(), 1);

        assert_eq!(state.balance(&alice, &usdc()), dec!(60));
        assert_eq!(state.balance(&bob, &usdc()), dec!(40));
        assert_eq!(state.events().len(), 1);
    }

    #[test]
    fn test_drop_rolls_back_everything() {
        let mut state = state();
        let alice = AccountId::new("alice");
        let bob = AccountId::new("bob");
        let token = CommitmentToken::new("t-1");

        {
            let mut tx = LedgerTx::begin(&mut state, Utc::now());
            tx.transfer(&alice, &bob, &usdc(), dec!(40)).unwrap();
            assert!(tx.consume_commitment(&token));
            tx.stats_mut().trade_count += 1;
            tx.emit(RouterEvent::VaultRemoved { vault: VaultId(1) });
        }

        assert_eq!(state.balance(&alice, &usdc()), dec!(100));
        assert_eq!(state.balance(&bob, &usdc()), Decimal::ZERO);
        assert!(!state.commitments().is_used(&token));
        assert_eq!(state.stats().trade_count, 0);
        assert!(state.events().is_empty());
    }

    #[test]
    fn test_savepoint_unwinds_suffix_only() {
        let mut state = state();
        let alice = AccountId::new("alice");
        let bob = AccountId::new("bob");
        let carol = AccountId::new("carol");

        let mut tx = LedgerTx::begin(&mut state, Utc::now());
        tx.transfer(&alice, &bob, &usdc(), dec!(10)).unwrap();
        let sp = tx.savepoint();
        tx.transfer(&alice, &carol, &usdc(), dec!(20)).unwrap();
        tx.emit(RouterEvent::VaultRemoved { vault: VaultId(2) });
        tx.rollback_to(sp);

        assert_eq!(tx.balance(&alice, &usdc()), dec!(90));
        assert_eq!(tx.balance(&carol, &usdc()), Decimal::ZERO);
        assert!(tx.pending_events().is_empty());
        tx.commit();

        assert_eq!(state.balance(&bob, &usdc()), dec!(10));
    }

    #[test]
    fn test_debit_rejects_overdraft() {
        let mut state = state();
        let alice = AccountId::new("alice");
        let mut tx = LedgerTx::begin(&mut state, Utc::now());

        let err = tx.debit(&alice, &usdc(), dec!(101)).unwrap_err();
        assert!(matches!(err, SluiceError::InsufficientBalance { .. }));
        assert_eq!(tx.balance(&alice, &usdc()), dec!(100));
    }

    #[test]
    fn test_credit_rejects_overflow() {
        let mut state = state();
        let alice = AccountId::new("alice");
        let mut tx = LedgerTx::begin(&mut state, Utc::now());

        let err = tx.credit(&alice, &usdc(), Decimal::MAX).unwrap_err();
        assert!(matches!(err, SluiceError::Validation(_)));
        assert_eq!(tx.balance(&alice, &usdc()), dec!(100));
    }

    #[test]
    fn test_vault_registration_rolls_back() {
        use crate::domain::VaultParams;

        let mut state = state();
        {
            let mut tx = LedgerTx::begin(&mut state, Utc::now());
            let id = tx.allocate_vault_id();
            tx.insert_vault(Vault::new(
                id,
                AccountId::new("owner"),
                VaultParams {
                    fee_bps: 10,
                    min_acceptable_price: Decimal::ZERO,
                    max_utilization_bps: 5_000,
                    max_liquidity: dec!(100),
                },
                Utc::now(),
            ));
        }
        assert_eq!(state.vaults().count(), 0);
        assert_eq!(state.next_vault_id, 1);
    }
}
