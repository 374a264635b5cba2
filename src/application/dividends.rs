//! Dividend Distributor
//!
//! Daily yield on liquid ALB, paid into the ALT dividends pool, followed by
//! the referral cascade. Every wallet credit and every bonus is a separate
//! unit of work.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::referrals::cascade_dividend_bonus;
use super::scheduler::{Job, JobGuard, RunOutcome};
use crate::domain::{percent_of, LedgerError, NewTransaction, Pool, Token, TxStatus, TxType, User, WalletId};
use crate::ports::LedgerStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DividendReport {
    pub wallets_credited: usize,
    pub bonuses_credited: usize,
    pub failures: usize,
    /// The staged daily income percent was rotated in
    pub rotated: bool,
}

pub struct DividendDistributor {
    store: Arc<dyn LedgerStore>,
    guard: JobGuard,
}

impl DividendDistributor {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            guard: JobGuard::new(),
        }
    }

    pub async fn run(&self) -> Result<RunOutcome<DividendReport>, LedgerError> {
        let Some(_permit) = self.guard.try_enter() else {
            tracing::warn!("Dividend run skipped - previous run still in progress");
            return Ok(RunOutcome::Skipped);
        };

        let wallet_ids = self.store.wallets_holding_alb().await?;
        let mut report = DividendReport::default();
        tracing::info!("Dividend run over {} wallets", wallet_ids.len());

        for wallet_id in wallet_ids {
            match self.credit_wallet(wallet_id).await {
                Ok(Some((owner, alt_yield))) => {
                    report.wallets_credited += 1;
                    if let Some(owner) = owner {
                        let cascade = cascade_dividend_bonus(self.store.as_ref(), &owner, alt_yield).await;
                        report.bonuses_credited += cascade.credited;
                        report.failures += cascade.failed;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Dividend credit for wallet {} failed: {}", wallet_id, e);
                    report.failures += 1;
                }
            }
        }

        let mut settings = self.store.settings().await?;
        if settings.rotate_daily_income() {
            self.store.save_settings(&settings).await?;
            report.rotated = true;
            tracing::info!("Daily income percent rotated to {}", settings.daily_income_alb_percent);
        }

        tracing::info!(
            "Dividend run: {} wallets, {} bonuses, {} failures",
            report.wallets_credited,
            report.bonuses_credited,
            report.failures
        );
        Ok(RunOutcome::Completed(report))
    }

    /// Credit one wallet's yield. Returns the owner (for the cascade) and the
    /// ALT yield, or `None` when nothing was due.
    async fn credit_wallet(&self, wallet_id: WalletId) -> Result<Option<(Option<User>, Decimal)>, LedgerError> {
        let settings = self.store.settings().await?;
        settings.ensure_rates()?;

        let mut unit = self.store.begin(wallet_id).await?;
        let alb_yield = percent_of(unit.wallet().alb_balance, settings.daily_income_alb_percent);
        if alb_yield <= Decimal::ZERO {
            return Ok(None);
        }
        let alt_yield = alb_yield * settings.alb_alt_rate;

        unit.wallet_mut().credit(Token::Alt, Pool::Dividends, alt_yield)?;
        unit.insert(
            NewTransaction::new(TxType::Dividends, TxStatus::Completed, Token::Alt, alt_yield)
                .from(Token::Alb, alb_yield)
                .alb_alt_rate(settings.alb_alt_rate),
        );
        let committed = self.store.commit(unit).await?;
        tracing::debug!("Dividends {} ALT to wallet {}", alt_yield, wallet_id);

        // the credit is committed; a failed lookup only costs the cascade
        let owner = match self.store.user(committed.wallet.user_id).await {
            Ok(Some(owner)) => Some(owner),
            Ok(None) => {
                tracing::warn!("Wallet {} has no owner - referral cascade skipped", wallet_id);
                None
            }
            Err(e) => {
                tracing::error!("Owner lookup for wallet {} failed: {} - referral cascade skipped", wallet_id, e);
                None
            }
        };
        Ok(Some((owner, alt_yield)))
    }
}

#[async_trait]
impl Job for DividendDistributor {
    fn name(&self) -> &'static str {
        "daily-dividends"
    }

    async fn run_once(&self) {
        if let Err(e) = self.run().await {
            tracing::error!("Dividend run failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{fund, ledger_fixture, open_account, set_settings, FaultyStore};
    use crate::ports::{SumFilter, TxQuery};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_scenario_thousand_alb() {
        let (store, _) = ledger_fixture();
        set_settings(&store, |s| {
            s.daily_income_alb_percent = dec!(1);
            s.future_daily_income_alb_percent = dec!(1);
            s.alb_alt_rate = dec!(0.5);
        })
        .await;
        let (user, wallet) = open_account(&store, "alice", None).await;
        fund(&store, wallet.id, |w| w.alb_balance = dec!(1000)).await;

        let outcome = DividendDistributor::new(store.clone()).run().await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed(DividendReport { wallets_credited: 1, bonuses_credited: 0, failures: 0, rotated: false })
        );

        let wallet = store.wallet_of(user.id).await.unwrap().unwrap();
        assert_eq!(wallet.alt_dividends, dec!(5));
        assert_eq!(wallet.alb_balance, dec!(1000));

        let txs = store.transactions(&TxQuery::latest(wallet.id, 10)).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].tx_type, TxType::Dividends);
        assert_eq!(txs[0].status, TxStatus::Completed);
        assert_eq!(txs[0].to_amount, dec!(5));
    }

    #[tokio::test]
    async fn test_locked_alb_earns_nothing() {
        let (store, _) = ledger_fixture();
        let (_, wallet) = open_account(&store, "alice", None).await;
        fund(&store, wallet.id, |w| w.locked_alb_balance = dec!(1000)).await;

        let outcome = DividendDistributor::new(store.clone()).run().await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed(DividendReport::default()));
    }

    #[tokio::test]
    async fn test_cascade_follows_dividend() {
        let (store, _) = ledger_fixture();
        let (top, _) = open_account(&store, "top", None).await;
        let (mid, _) = open_account(&store, "mid", Some(top.id)).await;
        let (_, wallet) = open_account(&store, "alice", Some(mid.id)).await;
        fund(&store, wallet.id, |w| w.alb_balance = dec!(10000)).await;

        let outcome = DividendDistributor::new(store.clone()).run().await.unwrap();
        let RunOutcome::Completed(report) = outcome else {
            panic!("run was skipped");
        };
        assert_eq!(report.wallets_credited, 1);
        assert_eq!(report.bonuses_credited, 2);

        // 1% of 10000 ALB at rate 1 = 100 ALT; 10% and 5% above
        let mid_wallet = store.wallet_of(mid.id).await.unwrap().unwrap();
        let top_wallet = store.wallet_of(top.id).await.unwrap().unwrap();
        assert_eq!(mid_wallet.alt_balance, dec!(10));
        assert_eq!(top_wallet.alt_balance, dec!(5));
        assert_eq!(
            store.sum_to_amount(&SumFilter::new(top_wallet.id, TxType::Bonus).level(2)).await.unwrap(),
            dec!(5)
        );
    }

    #[tokio::test]
    async fn test_rotation_after_run() {
        let (store, _) = ledger_fixture();
        set_settings(&store, |s| {
            s.daily_income_alb_percent = dec!(1);
            s.future_daily_income_alb_percent = dec!(2);
        })
        .await;
        let (user, wallet) = open_account(&store, "alice", None).await;
        fund(&store, wallet.id, |w| w.alb_balance = dec!(100)).await;

        let distributor = DividendDistributor::new(store.clone());
        let RunOutcome::Completed(first) = distributor.run().await.unwrap() else {
            panic!("run was skipped");
        };
        assert!(first.rotated);
        // the run itself used the old percent
        assert_eq!(store.wallet_of(user.id).await.unwrap().unwrap().alt_dividends, dec!(1));
        assert_eq!(store.settings().await.unwrap().daily_income_alb_percent, dec!(2));

        let RunOutcome::Completed(second) = distributor.run().await.unwrap() else {
            panic!("run was skipped");
        };
        assert!(!second.rotated);
        assert_eq!(store.wallet_of(user.id).await.unwrap().unwrap().alt_dividends, dec!(3));
    }

    #[tokio::test]
    async fn test_failure_does_not_block_batch() {
        let (store, _) = ledger_fixture();
        let (top, _) = open_account(&store, "top", None).await;
        let (mid, mid_wallet) = open_account(&store, "mid", Some(top.id)).await;
        let (alice, alice_wallet) = open_account(&store, "alice", None).await;
        let (bob, bob_wallet) = open_account(&store, "bob", Some(mid.id)).await;
        fund(&store, alice_wallet.id, |w| w.alb_balance = dec!(1000)).await;
        fund(&store, bob_wallet.id, |w| w.alb_balance = dec!(1000)).await;

        // alice's wallet cannot be locked, and neither can bob's level-1 referrer
        let faulty = Arc::new(
            FaultyStore::new(store.clone())
                .fail_wallet(alice_wallet.id)
                .fail_wallet(mid_wallet.id),
        );
        let outcome = DividendDistributor::new(faulty).run().await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed(DividendReport { wallets_credited: 1, bonuses_credited: 1, failures: 2, rotated: false })
        );

        assert_eq!(store.wallet_of(alice.id).await.unwrap().unwrap().alt_dividends, dec!(0));
        // bob's credit stands even though his level-1 bonus failed
        assert_eq!(store.wallet_of(bob.id).await.unwrap().unwrap().alt_dividends, dec!(10));
        assert_eq!(store.wallet_of(mid.id).await.unwrap().unwrap().alt_balance, dec!(0));
        // level 2 is still paid: 5% of 10
        assert_eq!(store.wallet_of(top.id).await.unwrap().unwrap().alt_balance, dec!(0.5));
    }

    #[tokio::test]
    async fn test_owner_lookup_failure_keeps_credit() {
        let (store, _) = ledger_fixture();
        let (top, _) = open_account(&store, "top", None).await;
        let (alice, wallet) = open_account(&store, "alice", Some(top.id)).await;
        fund(&store, wallet.id, |w| w.alb_balance = dec!(1000)).await;

        let faulty = Arc::new(FaultyStore::new(store.clone()).fail_user_lookup(alice.id));
        let outcome = DividendDistributor::new(faulty).run().await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed(DividendReport { wallets_credited: 1, bonuses_credited: 0, failures: 0, rotated: false })
        );

        assert_eq!(store.wallet_of(alice.id).await.unwrap().unwrap().alt_dividends, dec!(10));
        assert_eq!(store.wallet_of(top.id).await.unwrap().unwrap().alt_balance, dec!(0));
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let (store, _) = ledger_fixture();
        set_settings(&store, |s| s.future_daily_income_alb_percent = dec!(2)).await;
        let (user, wallet) = open_account(&store, "alice", None).await;
        fund(&store, wallet.id, |w| w.alb_balance = dec!(1000)).await;
        let distributor = DividendDistributor::new(store.clone());

        let _permit = distributor.guard.try_enter().unwrap();
        assert_eq!(distributor.run().await.unwrap(), RunOutcome::Skipped);

        assert_eq!(store.wallet_of(user.id).await.unwrap().unwrap().alt_dividends, dec!(0));
        assert_eq!(store.settings().await.unwrap().daily_income_alb_percent, dec!(1));
    }
}
