//! Lock Settlement
//!
//! Releases matured locked transactions. Each transaction is settled in its
//! own unit of work and re-read under the wallet lock, so a run never
//! settles the same transaction twice and one failure does not stop the
//! rest of the batch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::scheduler::{Job, JobGuard, RunOutcome};
use crate::domain::{LedgerError, Pool, Release, TxId, TxStatus};
use crate::ports::LedgerStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementReport {
    pub settled: usize,
    /// Already settled by the time the wallet lock was taken
    pub skipped: usize,
    pub failed: usize,
}

pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
    guard: JobGuard,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            guard: JobGuard::new(),
        }
    }

    pub async fn run(&self) -> Result<RunOutcome<SettlementReport>, LedgerError> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunOutcome<SettlementReport>, LedgerError> {
        let Some(_permit) = self.guard.try_enter() else {
            tracing::warn!("Settlement run skipped - previous run still in progress");
            return Ok(RunOutcome::Skipped);
        };

        let matured = self.store.matured_locked(now).await?;
        let mut report = SettlementReport::default();

        for tx in matured {
            match self.settle_one(tx.id, now).await {
                Ok(true) => report.settled += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::error!("Failed to settle transaction {}: {}", tx.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.settled + report.failed > 0 {
            tracing::info!(
                "Settlement run: {} settled, {} skipped, {} failed",
                report.settled,
                report.skipped,
                report.failed
            );
        }
        Ok(RunOutcome::Completed(report))
    }

    /// Settle one transaction; false when it no longer needs settling
    async fn settle_one(&self, tx_id: TxId, now: DateTime<Utc>) -> Result<bool, LedgerError> {
        let wallet_id = self
            .store
            .transaction(tx_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(tx_id))?
            .wallet_id;

        let mut unit = self.store.begin(wallet_id).await?;
        let Some(mut tx) = self.store.transaction(tx_id).await? else {
            return Err(LedgerError::TransactionNotFound(tx_id));
        };
        if !tx.is_matured(now) {
            return Ok(false);
        }

        match tx.release() {
            Release::Unlock { token, amount } => {
                unit.wallet_mut().transfer(token, Pool::Locked, Pool::Liquid, amount)?;
                tx.settle(TxStatus::Completed);
                tracing::info!("Released {} {} for wallet {} (tx {})", amount, token, wallet_id, tx_id);
            }
            Release::Park => {
                tx.settle(TxStatus::Pending);
                tracing::warn!(
                    "Locked {} transaction {} has no release rule - parked as PENDING",
                    tx.tx_type,
                    tx_id
                );
            }
        }

        unit.update(tx);
        self.store.commit(unit).await?;
        Ok(true)
    }
}

#[async_trait]
impl Job for SettlementEngine {
    fn name(&self) -> &'static str {
        "lock-settlement"
    }

    async fn run_once(&self) {
        if let Err(e) = self.run().await {
            tracing::error!("Settlement run failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{fund, ledger_fixture, open_account};
    use crate::application::{ReinvestRequest, SwapRequest};
    use crate::domain::{NewTransaction, Token, TxType};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_swap_released_only_after_maturity() {
        let (store, ledger) = ledger_fixture();
        let (user, wallet) = open_account(&store, "alice", None).await;
        fund(&store, wallet.id, |w| w.alt_balance = dec!(100)).await;

        let now = Utc::now();
        let request = SwapRequest { from: Token::Alt, to: Token::Alb, amount: dec!(50), alb_alt_rate: dec!(1) };
        let tx = ledger.swap_at("alice", request, now).await.unwrap().transaction;

        let engine = SettlementEngine::new(store.clone());
        let early = engine.run_at(now + Duration::days(2)).await.unwrap();
        assert_eq!(early, RunOutcome::Completed(SettlementReport::default()));

        let due = engine.run_at(now + Duration::days(3)).await.unwrap();
        assert_eq!(due, RunOutcome::Completed(SettlementReport { settled: 1, skipped: 0, failed: 0 }));

        let wallet = store.wallet_of(user.id).await.unwrap().unwrap();
        assert_eq!(wallet.locked_alb_balance, dec!(0));
        assert_eq!(wallet.alb_balance, dec!(50));

        let settled = store.transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(settled.status, TxStatus::Completed);
        assert!(!settled.is_locked);
        assert!(settled.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (store, ledger) = ledger_fixture();
        let (user, wallet) = open_account(&store, "alice", None).await;
        fund(&store, wallet.id, |w| w.alb_balance = dec!(40)).await;

        let now = Utc::now();
        let request = SwapRequest { from: Token::Alb, to: Token::Alt, amount: dec!(40), alb_alt_rate: dec!(1) };
        ledger.swap_at("alice", request, now).await.unwrap();

        let engine = SettlementEngine::new(store.clone());
        let later = now + Duration::days(10);
        engine.run_at(later).await.unwrap();
        let again = engine.run_at(later).await.unwrap();
        assert_eq!(again, RunOutcome::Completed(SettlementReport::default()));

        let wallet = store.wallet_of(user.id).await.unwrap().unwrap();
        assert_eq!(wallet.alt_balance, dec!(40));
        assert_eq!(wallet.locked_alt_balance, dec!(0));
    }

    #[tokio::test]
    async fn test_reinvest_and_park() {
        let (store, ledger) = ledger_fixture();
        let (user, wallet) = open_account(&store, "alice", None).await;
        fund(&store, wallet.id, |w| w.alt_dividends = dec!(20)).await;

        let now = Utc::now();
        ledger
            .reinvest_at("alice", ReinvestRequest { amount: dec!(20), alb_alt_rate: dec!(1) }, now)
            .await
            .unwrap();

        // a locked type without a release rule
        let mut unit = store.begin(wallet.id).await.unwrap();
        unit.insert(
            NewTransaction::new(TxType::Withdraw, TxStatus::Frozen, Token::Usdt, dec!(5))
                .locked_until(now - Duration::minutes(1)),
        );
        let odd = store.commit(unit).await.unwrap().inserted.remove(0);

        let engine = SettlementEngine::new(store.clone());
        let report = engine.run_at(now + Duration::days(3)).await.unwrap();
        assert_eq!(report, RunOutcome::Completed(SettlementReport { settled: 2, skipped: 0, failed: 0 }));

        let wallet = store.wallet_of(user.id).await.unwrap().unwrap();
        assert_eq!(wallet.alb_balance, dec!(20));
        let parked = store.transaction(odd.id).await.unwrap().unwrap();
        assert_eq!(parked.status, TxStatus::Pending);
        assert!(!parked.is_locked);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_batch() {
        let (store, ledger) = ledger_fixture();
        let (_, alice) = open_account(&store, "alice", None).await;
        let (bob_user, bob) = open_account(&store, "bob", None).await;
        fund(&store, alice.id, |w| w.alt_balance = dec!(100)).await;
        fund(&store, bob.id, |w| w.alt_balance = dec!(100)).await;

        let now = Utc::now();
        let request = SwapRequest { from: Token::Alt, to: Token::Alb, amount: dec!(50), alb_alt_rate: dec!(1) };
        ledger.swap_at("alice", request, now).await.unwrap();
        ledger.swap_at("bob", request, now).await.unwrap();

        // corrupt alice's locked pool so her release cannot be applied
        fund(&store, alice.id, |w| w.locked_alb_balance = dec!(0)).await;

        let engine = SettlementEngine::new(store.clone());
        let report = engine.run_at(now + Duration::days(3)).await.unwrap();
        assert_eq!(report, RunOutcome::Completed(SettlementReport { settled: 1, skipped: 0, failed: 1 }));

        let bob = store.wallet_of(bob_user.id).await.unwrap().unwrap();
        assert_eq!(bob.alb_balance, dec!(50));
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let (store, _) = ledger_fixture();
        let engine = SettlementEngine::new(store.clone());

        let _permit = engine.guard.try_enter().unwrap();
        assert_eq!(engine.run().await.unwrap(), RunOutcome::Skipped);
    }
}
