//! Request-driven ledger service
//!
//! `Ledger` owns the store handle shared by the swap, withdraw, reinvest and
//! account operations. Each mutation follows the same shape: resolve the
//! caller, read settings, open a unit of work on the wallet, validate
//! against the locked copy, stage the changes, commit.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::{LedgerError, SpendPlan, Transaction, User, Wallet};
use crate::ports::LedgerStore;

/// Outcome of a committed request-driven mutation
#[derive(Debug, Clone)]
pub struct Receipt {
    pub transaction: Transaction,
    pub wallet: Wallet,
    /// How an ALT spend was split, when the operation spent ALT
    pub spend: Option<SpendPlan>,
}

impl Receipt {
    /// True when part of the amount came out of the dividends pool
    pub fn is_take_from_dividends(&self) -> bool {
        self.spend.map_or(false, |plan| plan.touches_dividends())
    }
}

#[derive(Clone)]
pub struct Ledger {
    pub(crate) store: Arc<dyn LedgerStore>,
    /// Prefix of the invite link shown in account summaries
    pub(crate) referral_link_base: String,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            referral_link_base: String::new(),
        }
    }

    pub fn with_referral_link_base(mut self, base: impl Into<String>) -> Self {
        self.referral_link_base = base.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Resolve a caller and their wallet
    pub async fn account(&self, user_key: &str) -> Result<(User, Wallet), LedgerError> {
        load_account(self.store.as_ref(), user_key).await
    }

    /// Like [`Ledger::account`], rejecting frozen users
    pub async fn active_account(&self, user_key: &str) -> Result<(User, Wallet), LedgerError> {
        let (user, wallet) = self.account(user_key).await?;
        ensure_not_frozen(&user)?;
        Ok((user, wallet))
    }
}

pub async fn load_account(store: &dyn LedgerStore, user_key: &str) -> Result<(User, Wallet), LedgerError> {
    let user = store
        .user_by_key(user_key)
        .await?
        .ok_or_else(|| LedgerError::UserNotFound(user_key.to_string()))?;
    let wallet = store
        .wallet_of(user.id)
        .await?
        .ok_or_else(|| LedgerError::WalletNotFound(user_key.to_string()))?;
    Ok((user, wallet))
}

pub fn ensure_not_frozen(user: &User) -> Result<(), LedgerError> {
    if user.is_frozen {
        return Err(LedgerError::AccountFrozen);
    }
    Ok(())
}

pub fn ensure_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    Ok(())
}

/// Optimistic rate check; the caller resubmits with the current rate
pub fn ensure_rate(declared: Decimal, current: Decimal) -> Result<(), LedgerError> {
    if declared != current {
        return Err(LedgerError::RateMismatch { declared, current });
    }
    Ok(())
}

pub fn ensure_minimum(amount: Decimal, minimum: Decimal) -> Result<(), LedgerError> {
    if amount < minimum {
        return Err(LedgerError::BelowMinimum { amount, minimum });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rate_check_is_exact() {
        assert!(ensure_rate(dec!(0.5), dec!(0.50)).is_ok());
        assert_eq!(
            ensure_rate(dec!(0.4), dec!(0.5)),
            Err(LedgerError::RateMismatch { declared: dec!(0.4), current: dec!(0.5) })
        );
    }

    #[test]
    fn test_amount_guards() {
        assert!(ensure_positive(dec!(0)).is_err());
        assert!(ensure_positive(dec!(-1)).is_err());
        assert!(ensure_positive(dec!(0.000001)).is_ok());

        assert!(ensure_minimum(dec!(10), dec!(10)).is_ok());
        assert!(matches!(
            ensure_minimum(dec!(9.99), dec!(10)),
            Err(LedgerError::BelowMinimum { .. })
        ));
    }
}
