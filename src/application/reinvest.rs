//! Reinvestment Engine
//!
//! Converts accrued ALT back into locked ALB, draining dividends before
//! liquid ALT.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::ledger::{ensure_positive, ensure_rate, Ledger, Receipt};
use crate::domain::{
    lock_until, LedgerError, NewTransaction, Pool, SpendOrder, Token, TxStatus, TxType,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReinvestRequest {
    /// ALT to reinvest
    pub amount: Decimal,
    /// `alb_alt_rate` the client last observed
    pub alb_alt_rate: Decimal,
}

impl Ledger {
    pub async fn reinvest(&self, user_key: &str, request: ReinvestRequest) -> Result<Receipt, LedgerError> {
        self.reinvest_at(user_key, request, Utc::now()).await
    }

    pub async fn reinvest_at(
        &self,
        user_key: &str,
        request: ReinvestRequest,
        now: DateTime<Utc>,
    ) -> Result<Receipt, LedgerError> {
        let ReinvestRequest { amount, alb_alt_rate } = request;

        let (_, wallet) = self.active_account(user_key).await?;
        let settings = self.store.settings().await?;
        settings.ensure_rates()?;
        ensure_rate(alb_alt_rate, settings.alb_alt_rate)?;
        ensure_positive(amount)?;

        let mut unit = self.store.begin(wallet.id).await?;
        let plan = unit.wallet().plan_alt_spend(amount, SpendOrder::DividendsFirst)?;
        let alb_amount = amount / settings.alb_alt_rate;

        let wallet = unit.wallet_mut();
        wallet.apply_alt_spend(&plan)?;
        wallet.credit(Token::Alb, Pool::Locked, alb_amount)?;

        unit.insert(
            NewTransaction::new(TxType::Reinvest, TxStatus::Frozen, Token::Alb, alb_amount)
                .from(Token::Alt, amount)
                .alb_alt_rate(settings.alb_alt_rate)
                .locked_until(lock_until(now, settings.reinvest_cooldown_days)),
        );

        let committed = self.store.commit(unit).await?;
        let transaction = committed
            .record()
            .cloned()
            .ok_or_else(|| LedgerError::Store("reinvest commit returned no record".to_string()))?;

        tracing::info!(
            "Reinvest {} ALT -> {} locked ALB for {} (tx {})",
            amount,
            alb_amount,
            user_key,
            transaction.id
        );
        Ok(Receipt { transaction, wallet: committed.wallet, spend: Some(plan) })
    }
}
