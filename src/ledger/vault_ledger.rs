//! Vault bookkeeping: settle, deposit, withdraw, parameter updates.
//!
//! Settlement re-checks the utilization bound against the vault's balance at
//! settlement time, never the balance seen when the plan was quoted.

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::tx::LedgerTx;
use crate::domain::{apply_bps, AccountId, RouterEvent, Vault, VaultId, VaultParams};
use crate::error::VaultError;

type VaultResult<T> = std::result::Result<T, VaultError>;

fn require_owner(vault: &Vault, caller: &AccountId, operation: &str) -> VaultResult<()> {
    if &vault.owner != caller {
        return Err(VaultError::Unauthorized {
            caller: caller.to_string(),
            operation: operation.to_string(),
        });
    }
    Ok(())
}

impl LedgerTx<'_> {
    /// Pay `output` from vault `id` to `recipient` at `price`.
    ///
    /// Returns the input the vault is owed (cost + fee). Only the execution
    /// engine identity may call this, and never while halted.
    pub fn settle_vault(
        &mut self,
        caller: &AccountId,
        id: VaultId,
        output: Decimal,
        recipient: &AccountId,
        price: Decimal,
    ) -> VaultResult<Decimal> {
        if caller != &self.state().admin.engine_identity {
            return Err(VaultError::Unauthorized {
                caller: caller.to_string(),
                operation: "settle".to_string(),
            });
        }
        if self.state().is_halted() {
            return Err(VaultError::Halted);
        }

        let vault = self.state().vault(id).ok_or(VaultError::NotFound(id.0))?;
        let allowed = vault.max_fill();
        if output > allowed {
            warn!(
                "{} settle of {} exceeds live utilization bound {}",
                id, output, allowed
            );
            return Err(VaultError::UtilizationExceeded {
                requested: output,
                allowed,
            });
        }
        if output <= Decimal::ZERO {
            return Err(VaultError::InsufficientLiquidity {
                requested: output,
                available: vault.available_liquidity,
            });
        }

        let cost = output * price;
        let fee = apply_bps(cost, vault.fee_bps());

        let vault = self.vault_mut(id)?;
        vault.available_liquidity -= output;
        vault.fees_earned += fee;
        vault.volume += output;
        vault.trade_count += 1;

        let output_asset = self.state().pair.output.clone();
        self.credit(recipient, &output_asset, output)
            .map_err(|e| VaultError::InvalidParameters(e.to_string()))?;

        Ok(cost + fee)
    }

    /// Owner moves output-asset funds into the vault, up to its cap.
    pub fn deposit_vault(
        &mut self,
        caller: &AccountId,
        id: VaultId,
        amount: Decimal,
    ) -> crate::error::Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(crate::error::SluiceError::ZeroAmount);
        }
        if self.state().is_halted() {
            return Err(VaultError::Halted.into());
        }

        let vault = self.state().vault(id).ok_or(VaultError::NotFound(id.0))?;
        require_owner(vault, caller, "deposit")?;
        let cap = vault.params.max_liquidity;
        let after = match vault.available_liquidity.checked_add(amount) {
            Some(after) if after <= cap => after,
            overflowed => {
                return Err(VaultError::DepositCapExceeded {
                    after: overflowed.unwrap_or(Decimal::MAX),
                    cap,
                }
                .into())
            }
        };

        let output_asset = self.state().pair.output.clone();
        self.debit(caller, &output_asset, amount)?;

        let vault = self.vault_mut(id)?;
        vault.available_liquidity = after;
        vault.total_deposited += amount;

        self.emit(RouterEvent::VaultDeposit {
            vault: id,
            amount,
            balance: after,
        });
        info!("{} deposit {} (balance {})", id, amount, after);
        Ok(after)
    }

    /// Owner takes funds back out. Allowed while halted and after delisting.
    pub fn withdraw_vault(
        &mut self,
        caller: &AccountId,
        id: VaultId,
        amount: Decimal,
    ) -> crate::error::Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(crate::error::SluiceError::ZeroAmount);
        }

        let vault = self.state().vault(id).ok_or(VaultError::NotFound(id.0))?;
        require_owner(vault, caller, "withdraw")?;
        if amount > vault.available_liquidity {
            return Err(VaultError::InsufficientLiquidity {
                requested: amount,
                available: vault.available_liquidity,
            }
            .into());
        }

        let vault = self.vault_mut(id)?;
        vault.available_liquidity -= amount;
        let remaining = vault.available_liquidity;

        let output_asset = self.state().pair.output.clone();
        self.credit(caller, &output_asset, amount)?;

        self.emit(RouterEvent::VaultWithdrawal {
            vault: id,
            amount,
            balance: remaining,
        });
        info!("{} withdrawal {} (balance {})", id, amount, remaining);
        Ok(remaining)
    }

    pub fn update_vault_params(
        &mut self,
        caller: &AccountId,
        id: VaultId,
        params: VaultParams,
    ) -> crate::error::Result<()> {
        params.validate()?;
        let vault = self.state().vault(id).ok_or(VaultError::NotFound(id.0))?;
        require_owner(vault, caller, "update_parameters")?;

        let vault = self.vault_mut(id)?;
        vault.params = params.clone();

        self.emit(RouterEvent::VaultParametersUpdated { vault: id, params });
        info!("{} parameters updated", id);
        Ok(())
    }

    pub(crate) fn register_vault(
        &mut self,
        owner: AccountId,
        params: VaultParams,
    ) -> crate::error::Result<VaultId> {
        params.validate()?;
        if owner.is_empty() {
            return Err(crate::error::SluiceError::Validation(
                "vault owner cannot be empty".to_string(),
            ));
        }

        let id = self.allocate_vault_id();
        let created_at = self.now();
        self.insert_vault(Vault::new(id, owner.clone(), params.clone(), created_at));
        self.emit(RouterEvent::VaultRegistered {
            vault: id,
            owner,
            params,
        });
        Ok(id)
    }

    /// Remove from routing; balances stay owner-controlled
    pub(crate) fn delist_vault(&mut self, id: VaultId) -> crate::error::Result<()> {
        let vault = self.vault_mut(id)?;
        vault.listed = false;
        self.emit(RouterEvent::VaultRemoved { vault: id });
        Ok(())
    }
}
