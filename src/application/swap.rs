//! Swap Engine
//!
//! ALT -> ALB draws liquid ALT then dividends and lands in locked ALB.
//! ALB -> ALT draws liquid ALB only and lands in locked ALT. Both
//! directions create a FROZEN transaction released later by settlement.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::ledger::{ensure_minimum, ensure_positive, ensure_rate, Ledger, Receipt};
use crate::domain::{
    lock_until, LedgerError, NewTransaction, Pool, SpendOrder, Token, TxStatus, TxType,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapRequest {
    pub from: Token,
    pub to: Token,
    pub amount: Decimal,
    /// `alb_alt_rate` the client last observed
    pub alb_alt_rate: Decimal,
}

impl Ledger {
    pub async fn swap(&self, user_key: &str, request: SwapRequest) -> Result<Receipt, LedgerError> {
        self.swap_at(user_key, request, Utc::now()).await
    }

    pub async fn swap_at(
        &self,
        user_key: &str,
        request: SwapRequest,
        now: DateTime<Utc>,
    ) -> Result<Receipt, LedgerError> {
        let SwapRequest { from, to, amount, alb_alt_rate } = request;
        if !matches!((from, to), (Token::Alt, Token::Alb) | (Token::Alb, Token::Alt)) {
            return Err(LedgerError::WrongTokenPair { from, to });
        }

        let (_, wallet) = self.active_account(user_key).await?;
        let settings = self.store.settings().await?;
        settings.ensure_rates()?;
        ensure_rate(alb_alt_rate, settings.alb_alt_rate)?;
        ensure_positive(amount)?;

        let mut unit = self.store.begin(wallet.id).await?;
        let (tx, spend) = if from == Token::Alt {
            ensure_minimum(amount, settings.min_swap_alt_amount)?;
            let plan = unit.wallet().plan_alt_spend(amount, SpendOrder::LiquidFirst)?;
            let alb_amount = amount / settings.alb_alt_rate;

            let wallet = unit.wallet_mut();
            wallet.apply_alt_spend(&plan)?;
            wallet.credit(Token::Alb, Pool::Locked, alb_amount)?;

            let tx = NewTransaction::new(TxType::Swap, TxStatus::Frozen, Token::Alb, alb_amount)
                .from(Token::Alt, amount)
                .alb_alt_rate(settings.alb_alt_rate)
                .locked_until(lock_until(now, settings.alt_alb_cooldown_days));
            (tx, Some(plan))
        } else {
            ensure_minimum(amount, settings.min_swap_alb_amount)?;
            unit.wallet().ensure_alb_spendable(amount)?;
            let alt_amount = amount * settings.alb_alt_rate;

            let wallet = unit.wallet_mut();
            wallet.debit(Token::Alb, Pool::Liquid, amount)?;
            wallet.credit(Token::Alt, Pool::Locked, alt_amount)?;

            let tx = NewTransaction::new(TxType::Swap, TxStatus::Frozen, Token::Alt, alt_amount)
                .from(Token::Alb, amount)
                .alb_alt_rate(settings.alb_alt_rate)
                .locked_until(lock_until(now, settings.alb_alt_cooldown_days));
            (tx, None)
        };

        unit.insert(tx);
        let committed = self.store.commit(unit).await?;
        let transaction = committed
            .record()
            .cloned()
            .ok_or_else(|| LedgerError::Store("swap commit returned no record".to_string()))?;

        tracing::info!(
            "Swap {} {} -> {} {} for {} (tx {})",
            amount,
            from,
            transaction.to_amount,
            to,
            user_key,
            transaction.id
        );
        Ok(Receipt { transaction, wallet: committed.wallet, spend })
    }
}
