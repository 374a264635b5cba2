//! Application Layer - Ledger use cases and background jobs
//!
//! Request-driven operations hang off [`Ledger`]; deposits go through
//! [`DepositVerifier`] because they also need the chain oracle and the fee
//! relay. Settlement and dividends are [`Job`]s driven by the [`Scheduler`].

pub mod account;
pub mod deposit;
pub mod dividends;
pub mod ledger;
pub mod referrals;
pub mod reinvest;
pub mod retry;
pub mod scheduler;
pub mod settlement;
pub mod swap;
pub mod withdraw;

pub use account::{AccountSummary, HistoryQuery, Registration, MAX_HISTORY_LIMIT};
pub use deposit::{DepositConfig, DepositReceipt, DepositVerifier, FeeSponsor};
pub use dividends::{DividendDistributor, DividendReport};
pub use ledger::{Ledger, Receipt};
pub use referrals::{count_referrals, ReferralCount};
pub use reinvest::ReinvestRequest;
pub use retry::RetryPolicy;
pub use scheduler::{parse_daily_time, Job, JobGuard, RunOutcome, Schedule, Scheduler};
pub use settlement::{SettlementEngine, SettlementReport};
pub use swap::SwapRequest;
pub use withdraw::WithdrawRequest;

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashSet;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use super::Ledger;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::{Lang, NewUser, Settings, Transaction, TxId, User, UserId, Wallet, WalletId};
    use crate::ports::{Committed, LedgerStore, StoreError, SumFilter, TxQuery, UnitOfWork};

    pub const DEPOSIT_ADDRESS: &str = "TLa2f6VPqDgRE67v1736s7bJ8Ray5wYjU7";

    pub fn ledger_fixture() -> (Arc<MemoryStore>, Ledger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(store.clone());
        (store, ledger)
    }

    pub async fn open_account(store: &MemoryStore, key: &str, referrer: Option<UserId>) -> (User, Wallet) {
        store
            .create_user(NewUser {
                key: key.to_string(),
                referrer_id: referrer,
                lang: Lang::En,
                deposit_address: format!("TDeposit{key}"),
            })
            .await
            .unwrap()
    }

    /// Overwrite balances directly through a unit of work
    pub async fn fund(store: &MemoryStore, wallet_id: WalletId, edit: impl FnOnce(&mut Wallet)) -> Wallet {
        let mut unit = store.begin(wallet_id).await.unwrap();
        edit(unit.wallet_mut());
        store.commit(unit).await.unwrap().wallet
    }

    pub async fn set_settings(store: &MemoryStore, edit: impl FnOnce(&mut Settings)) {
        let mut settings = store.settings().await.unwrap();
        edit(&mut settings);
        store.save_settings(&settings).await.unwrap();
    }

    /// Memory store that fails `begin` for chosen wallets and `user` for chosen users
    pub struct FaultyStore {
        pub inner: Arc<MemoryStore>,
        failing_wallets: HashSet<WalletId>,
        failing_users: HashSet<UserId>,
    }

    impl FaultyStore {
        pub fn new(inner: Arc<MemoryStore>) -> Self {
            Self {
                inner,
                failing_wallets: HashSet::new(),
                failing_users: HashSet::new(),
            }
        }

        pub fn fail_wallet(mut self, wallet_id: WalletId) -> Self {
            self.failing_wallets.insert(wallet_id);
            self
        }

        pub fn fail_user_lookup(mut self, user_id: UserId) -> Self {
            self.failing_users.insert(user_id);
            self
        }
    }

    #[async_trait]
    impl LedgerStore for FaultyStore {
        async fn settings(&self) -> Result<Settings, StoreError> {
            self.inner.settings().await
        }

        async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
            self.inner.save_settings(settings).await
        }

        async fn create_user(&self, new_user: NewUser) -> Result<(User, Wallet), StoreError> {
            self.inner.create_user(new_user).await
        }

        async fn update_user(&self, user: &User) -> Result<(), StoreError> {
            self.inner.update_user(user).await
        }

        async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
            if self.failing_users.contains(&id) {
                return Err(StoreError::Persistence(format!("user {} unreadable", id)));
            }
            self.inner.user(id).await
        }

        async fn user_by_key(&self, key: &str) -> Result<Option<User>, StoreError> {
            self.inner.user_by_key(key).await
        }

        async fn referrals_of(&self, referrer_ids: &[UserId]) -> Result<Vec<User>, StoreError> {
            self.inner.referrals_of(referrer_ids).await
        }

        async fn users_with_deposits(&self, user_ids: &[UserId]) -> Result<HashSet<UserId>, StoreError> {
            self.inner.users_with_deposits(user_ids).await
        }

        async fn wallet_of(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
            self.inner.wallet_of(user_id).await
        }

        async fn wallets_holding_alb(&self) -> Result<Vec<WalletId>, StoreError> {
            self.inner.wallets_holding_alb().await
        }

        async fn transaction(&self, id: TxId) -> Result<Option<Transaction>, StoreError> {
            self.inner.transaction(id).await
        }

        async fn deposit_by_hash(&self, hash: &str) -> Result<Option<Transaction>, StoreError> {
            self.inner.deposit_by_hash(hash).await
        }

        async fn matured_locked(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>, StoreError> {
            self.inner.matured_locked(now).await
        }

        async fn transactions(&self, query: &TxQuery) -> Result<Vec<Transaction>, StoreError> {
            self.inner.transactions(query).await
        }

        async fn sum_to_amount(&self, filter: &SumFilter) -> Result<Decimal, StoreError> {
            self.inner.sum_to_amount(filter).await
        }

        async fn begin(&self, wallet_id: WalletId) -> Result<UnitOfWork, StoreError> {
            if self.failing_wallets.contains(&wallet_id) {
                return Err(StoreError::Persistence(format!("wallet {} unavailable", wallet_id)));
            }
            self.inner.begin(wallet_id).await
        }

        async fn commit(&self, unit: UnitOfWork) -> Result<Committed, StoreError> {
            self.inner.commit(unit).await
        }
    }
}

