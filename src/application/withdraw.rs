//! Withdrawal Processor
//!
//! Debits liquid ALT then dividends and records a PENDING payout in USDT.
//! The payout itself is executed off-ledger.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use super::ledger::{ensure_minimum, ensure_positive, ensure_rate, Ledger, Receipt};
use crate::domain::{LedgerError, NewTransaction, SpendOrder, Token, TxStatus, TxType};
use crate::ports::TxQuery;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawRequest {
    /// ALT to withdraw
    pub amount: Decimal,
    /// `alt_usdt_rate` the client last observed
    pub alt_usdt_rate: Decimal,
}

impl Ledger {
    pub async fn withdraw(&self, user_key: &str, request: WithdrawRequest) -> Result<Receipt, LedgerError> {
        self.withdraw_at(user_key, request, Utc::now()).await
    }

    pub async fn withdraw_at(
        &self,
        user_key: &str,
        request: WithdrawRequest,
        now: DateTime<Utc>,
    ) -> Result<Receipt, LedgerError> {
        let WithdrawRequest { amount, alt_usdt_rate } = request;

        let (_, wallet) = self.active_account(user_key).await?;
        let settings = self.store.settings().await?;
        settings.ensure_rates()?;
        ensure_rate(alt_usdt_rate, settings.alt_usdt_rate)?;
        ensure_positive(amount)?;
        ensure_minimum(amount, settings.withdraw_min_amount)?;

        let mut unit = self.store.begin(wallet.id).await?;
        if unit.wallet().withdraw_address.is_none() {
            return Err(LedgerError::WithdrawAddressMissing);
        }

        if settings.withdraw_cooldown_days > 0 {
            let last = self
                .store
                .transactions(&TxQuery::latest(wallet.id, 1).of_type(TxType::Withdraw))
                .await?;
            if let Some(previous) = last.first() {
                let next_allowed = previous.created_at + Duration::days(settings.withdraw_cooldown_days as i64);
                if now < next_allowed {
                    return Err(LedgerError::WithdrawCooldown(next_allowed));
                }
            }
        }

        let plan = unit.wallet().plan_alt_spend(amount, SpendOrder::LiquidFirst)?;
        unit.wallet_mut().apply_alt_spend(&plan)?;

        let usdt_amount = amount * settings.alt_usdt_rate;
        unit.insert(
            NewTransaction::new(TxType::Withdraw, TxStatus::Pending, Token::Usdt, usdt_amount)
                .from(Token::Alt, amount)
                .alt_usdt_rate(settings.alt_usdt_rate)
                .fee_usdt(settings.withdraw_fee_usdt),
        );

        let committed = self.store.commit(unit).await?;
        let transaction = committed
            .record()
            .cloned()
            .ok_or_else(|| LedgerError::Store("withdraw commit returned no record".to_string()))?;

        tracing::info!(
            "Withdraw {} ALT ({} USDT) for {} - liquid {}, dividends {} (tx {})",
            amount,
            usdt_amount,
            user_key,
            plan.from_liquid,
            plan.from_dividends,
            transaction.id
        );
        Ok(Receipt { transaction, wallet: committed.wallet, spend: Some(plan) })
    }
}
