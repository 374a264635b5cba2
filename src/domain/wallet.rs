//! Wallet Ledger
//!
//! Per-user balance state and the credit/debit primitives. A primitive only
//! touches the single pool it names; spillover across pools is planned up
//! front with [`Wallet::plan_alt_spend`] and then applied as two debits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use super::token::{Pool, Token};
use super::user::UserId;

pub type WalletId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub alt_balance: Decimal,
    pub locked_alt_balance: Decimal,
    pub alt_dividends: Decimal,
    pub alb_balance: Decimal,
    pub locked_alb_balance: Decimal,
    /// Dedicated chain address users send stablecoin deposits to
    pub deposit_address: String,
    pub withdraw_address: Option<String>,
    /// Set once the fee relay has sponsored a transfer from the deposit address
    pub is_activated: bool,
}

/// Which ALT pool is drained first when an amount spills over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendOrder {
    /// Liquid, then dividends (swap, withdraw)
    LiquidFirst,
    /// Dividends, then liquid (reinvest)
    DividendsFirst,
}

/// Pre-validated split of an ALT spend across liquid and dividends
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendPlan {
    pub from_liquid: Decimal,
    pub from_dividends: Decimal,
}

impl SpendPlan {
    pub fn total(&self) -> Decimal {
        self.from_liquid + self.from_dividends
    }

    pub fn touches_dividends(&self) -> bool {
        self.from_dividends > Decimal::ZERO
    }
}

impl Wallet {
    pub fn new(id: WalletId, user_id: UserId, deposit_address: String) -> Self {
        Self {
            id,
            user_id,
            alt_balance: Decimal::ZERO,
            locked_alt_balance: Decimal::ZERO,
            alt_dividends: Decimal::ZERO,
            alb_balance: Decimal::ZERO,
            locked_alb_balance: Decimal::ZERO,
            deposit_address,
            withdraw_address: None,
            is_activated: false,
        }
    }

    /// Current balance of a pool
    pub fn balance(&self, token: Token, pool: Pool) -> Result<Decimal, LedgerError> {
        match (token, pool) {
            (Token::Alt, Pool::Liquid) => Ok(self.alt_balance),
            (Token::Alt, Pool::Locked) => Ok(self.locked_alt_balance),
            (Token::Alt, Pool::Dividends) => Ok(self.alt_dividends),
            (Token::Alb, Pool::Liquid) => Ok(self.alb_balance),
            (Token::Alb, Pool::Locked) => Ok(self.locked_alb_balance),
            _ => Err(LedgerError::InvalidPool { token, pool }),
        }
    }

    fn slot_mut(&mut self, token: Token, pool: Pool) -> Result<&mut Decimal, LedgerError> {
        match (token, pool) {
            (Token::Alt, Pool::Liquid) => Ok(&mut self.alt_balance),
            (Token::Alt, Pool::Locked) => Ok(&mut self.locked_alt_balance),
            (Token::Alt, Pool::Dividends) => Ok(&mut self.alt_dividends),
            (Token::Alb, Pool::Liquid) => Ok(&mut self.alb_balance),
            (Token::Alb, Pool::Locked) => Ok(&mut self.locked_alb_balance),
            _ => Err(LedgerError::InvalidPool { token, pool }),
        }
    }

    pub fn credit(&mut self, token: Token, pool: Pool, amount: Decimal) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidCredit(amount));
        }
        *self.slot_mut(token, pool)? += amount;
        Ok(())
    }

    /// Debit a single pool. Never spills into another pool.
    pub fn debit(&mut self, token: Token, pool: Pool, amount: Decimal) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let slot = self.slot_mut(token, pool)?;
        if *slot < amount {
            return Err(LedgerError::InsufficientFunds {
                token,
                available: *slot,
                requested: amount,
            });
        }
        *slot -= amount;
        Ok(())
    }

    /// Move an amount between two pools of the same token
    pub fn transfer(&mut self, token: Token, from: Pool, to: Pool, amount: Decimal) -> Result<(), LedgerError> {
        self.debit(token, from, amount)?;
        self.credit(token, to, amount)
    }

    /// Liquid plus dividends ALT
    pub fn spendable_alt(&self) -> Decimal {
        self.alt_balance + self.alt_dividends
    }

    /// Split an ALT spend across liquid and dividends in the given order.
    ///
    /// Fails with `FundsLocked` when the spendable pools fall short but the
    /// locked ALT pool would cover the difference, `InsufficientFunds` otherwise.
    pub fn plan_alt_spend(&self, amount: Decimal, order: SpendOrder) -> Result<SpendPlan, LedgerError> {
        let spendable = self.spendable_alt();
        if spendable < amount {
            return Err(shortfall(Token::Alt, spendable, self.locked_alt_balance, amount));
        }

        let plan = match order {
            SpendOrder::LiquidFirst => {
                let from_liquid = amount.min(self.alt_balance);
                SpendPlan { from_liquid, from_dividends: amount - from_liquid }
            }
            SpendOrder::DividendsFirst => {
                let from_dividends = amount.min(self.alt_dividends);
                SpendPlan { from_liquid: amount - from_dividends, from_dividends }
            }
        };
        Ok(plan)
    }

    /// Apply a plan produced by [`Wallet::plan_alt_spend`]
    pub fn apply_alt_spend(&mut self, plan: &SpendPlan) -> Result<(), LedgerError> {
        self.debit(Token::Alt, Pool::Liquid, plan.from_liquid)?;
        self.debit(Token::Alt, Pool::Dividends, plan.from_dividends)
    }

    /// ALB is only ever spent from its liquid pool
    pub fn ensure_alb_spendable(&self, amount: Decimal) -> Result<(), LedgerError> {
        if self.alb_balance < amount {
            return Err(shortfall(Token::Alb, self.alb_balance, self.locked_alb_balance, amount));
        }
        Ok(())
    }

    /// True when every pool is non-negative
    pub fn is_consistent(&self) -> bool {
        [
            self.alt_balance,
            self.locked_alt_balance,
            self.alt_dividends,
            self.alb_balance,
            self.locked_alb_balance,
        ]
        .iter()
        .all(|b| *b >= Decimal::ZERO)
    }
}

fn shortfall(token: Token, available: Decimal, locked: Decimal, requested: Decimal) -> LedgerError {
    let total_with_locked = available + locked;
    if locked > Decimal::ZERO && total_with_locked >= requested {
        LedgerError::FundsLocked {
            token,
            locked,
            total_with_locked,
            requested,
        }
    } else {
        LedgerError::InsufficientFunds {
            token,
            available,
            requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wallet(liquid: Decimal, dividends: Decimal, locked: Decimal) -> Wallet {
        let mut w = Wallet::new(1, 1, "TDeposit".to_string());
        w.alt_balance = liquid;
        w.alt_dividends = dividends;
        w.locked_alt_balance = locked;
        w
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let mut w = wallet(dec!(10), dec!(0), dec!(0));
        let err = w.debit(Token::Alt, Pool::Liquid, dec!(11)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(w.alt_balance, dec!(10));
    }

    #[test]
    fn test_debit_does_not_spill() {
        let mut w = wallet(dec!(10), dec!(100), dec!(0));
        assert!(w.debit(Token::Alt, Pool::Liquid, dec!(20)).is_err());
        assert_eq!(w.alt_dividends, dec!(100));
    }

    #[test]
    fn test_alb_has_no_dividend_pool() {
        let mut w = wallet(dec!(0), dec!(0), dec!(0));
        let err = w.credit(Token::Alb, Pool::Dividends, dec!(1)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPool { .. }));
        assert!(w.balance(Token::Usdt, Pool::Liquid).is_err());
    }

    #[test]
    fn test_negative_credit_rejected() {
        let mut w = wallet(dec!(0), dec!(0), dec!(0));
        assert!(w.credit(Token::Alt, Pool::Liquid, dec!(-1)).is_err());
    }

    #[test]
    fn test_liquid_first_spillover() {
        let w = wallet(dec!(50), dec!(100), dec!(0));
        let plan = w.plan_alt_spend(dec!(120), SpendOrder::LiquidFirst).unwrap();
        assert_eq!(plan.from_liquid, dec!(50));
        assert_eq!(plan.from_dividends, dec!(70));
        assert!(plan.touches_dividends());
    }

    #[test]
    fn test_dividends_first_spillover() {
        let w = wallet(dec!(100), dec!(30), dec!(0));
        let plan = w.plan_alt_spend(dec!(80), SpendOrder::DividendsFirst).unwrap();
        assert_eq!(plan.from_dividends, dec!(30));
        assert_eq!(plan.from_liquid, dec!(50));
        assert_eq!(plan.total(), dec!(80));
    }

    #[test]
    fn test_no_spillover_needed() {
        let w = wallet(dec!(100), dec!(30), dec!(0));
        let plan = w.plan_alt_spend(dec!(40), SpendOrder::LiquidFirst).unwrap();
        assert_eq!(plan.from_liquid, dec!(40));
        assert!(!plan.touches_dividends());
    }

    #[test]
    fn test_locked_funds_distinguished() {
        let w = wallet(dec!(50), dec!(20), dec!(100));
        let err = w.plan_alt_spend(dec!(100), SpendOrder::LiquidFirst).unwrap_err();
        assert_eq!(err.locked_amount(), Some(dec!(100)));

        let err = w.plan_alt_spend(dec!(500), SpendOrder::LiquidFirst).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_apply_plan() {
        let mut w = wallet(dec!(50), dec!(100), dec!(0));
        let plan = w.plan_alt_spend(dec!(120), SpendOrder::LiquidFirst).unwrap();
        w.apply_alt_spend(&plan).unwrap();
        assert_eq!(w.alt_balance, dec!(0));
        assert_eq!(w.alt_dividends, dec!(30));
        assert!(w.is_consistent());
    }

    #[test]
    fn test_alb_spend_locked() {
        let mut w = wallet(dec!(0), dec!(0), dec!(0));
        w.alb_balance = dec!(5);
        w.locked_alb_balance = dec!(50);
        assert!(matches!(
            w.ensure_alb_spendable(dec!(20)),
            Err(LedgerError::FundsLocked { token: Token::Alb, .. })
        ));
        assert!(w.ensure_alb_spendable(dec!(5)).is_ok());
    }

    #[test]
    fn test_transfer_between_pools() {
        let mut w = wallet(dec!(0), dec!(0), dec!(0));
        w.locked_alb_balance = dec!(80);
        w.transfer(Token::Alb, Pool::Locked, Pool::Liquid, dec!(80)).unwrap();
        assert_eq!(w.locked_alb_balance, dec!(0));
        assert_eq!(w.alb_balance, dec!(80));
    }
}
