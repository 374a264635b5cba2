//! In-memory ledger store
//!
//! Rows live behind one `RwLock`; each wallet additionally owns a mutex
//! that plays the role of a row lock for the duration of a unit of work.
//! Commits validate everything before touching state, so a rejected
//! commit leaves no trace. A store opened on a data directory writes the
//! snapshot inside every mutation and only swaps the new state in once the
//! write succeeded.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use super::snapshot::SnapshotFile;
use crate::domain::{
    NewUser, Settings, Transaction, TxId, TxType, User, UserId, Wallet, WalletId,
};
use crate::ports::store::{
    Committed, LedgerStore, SortOrder, StoreError, SumFilter, TxQuery, UnitOfWork,
};

/// Serializable contents of the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerState {
    pub settings: Option<Settings>,
    pub users: BTreeMap<UserId, User>,
    pub wallets: BTreeMap<WalletId, Wallet>,
    pub transactions: BTreeMap<TxId, Transaction>,
    #[serde(default)]
    last_user_id: u64,
    #[serde(default)]
    last_wallet_id: u64,
    #[serde(default)]
    last_tx_id: u64,
}

impl LedgerState {
    fn next_user_id(&mut self) -> UserId {
        self.last_user_id += 1;
        self.last_user_id
    }

    fn next_wallet_id(&mut self) -> WalletId {
        self.last_wallet_id += 1;
        self.last_wallet_id
    }

    fn next_tx_id(&mut self) -> TxId {
        self.last_tx_id += 1;
        self.last_tx_id
    }

    fn has_deposit_hash(&self, hash: &str) -> bool {
        self.transactions
            .values()
            .any(|tx| tx.tx_type == TxType::Deposit && tx.hash.as_deref() == Some(hash))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<LedgerState>,
    wallet_locks: StdMutex<HashMap<WalletId, Arc<Mutex<()>>>>,
    journal: Option<SnapshotFile>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: LedgerState) -> Self {
        Self {
            state: RwLock::new(state),
            wallet_locks: StdMutex::new(HashMap::new()),
            journal: None,
        }
    }

    pub(super) fn with_journal(mut self, file: SnapshotFile) -> Self {
        self.journal = Some(file);
        self
    }

    fn persist(&self, state: &LedgerState) -> Result<(), StoreError> {
        match &self.journal {
            Some(file) => state.save(file.path()),
            None => Ok(()),
        }
    }

    fn wallet_lock(&self, wallet_id: WalletId) -> Arc<Mutex<()>> {
        let mut locks = self
            .wallet_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(wallet_id).or_default().clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn settings(&self) -> Result<Settings, StoreError> {
        if let Some(settings) = self.state.read().await.settings.clone() {
            return Ok(settings);
        }
        let mut state = self.state.write().await;
        let settings = state.settings.get_or_insert_with(|| {
            tracing::info!("Settings record missing - creating defaults");
            Settings::default()
        });
        Ok(settings.clone())
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.settings = Some(settings.clone());
        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<(User, Wallet), StoreError> {
        let mut state = self.state.write().await;

        if state.users.values().any(|u| u.key == new_user.key) {
            return Err(StoreError::DuplicateUser(new_user.key));
        }
        if let Some(referrer_id) = new_user.referrer_id {
            if !state.users.contains_key(&referrer_id) {
                return Err(StoreError::ReferrerNotFound(referrer_id));
            }
        }

        let mut next = state.clone();
        let user = User {
            id: next.next_user_id(),
            key: new_user.key,
            referrer_id: new_user.referrer_id,
            is_frozen: false,
            is_newbie: true,
            lang: new_user.lang,
            created_at: Utc::now(),
        };
        let wallet = Wallet::new(next.next_wallet_id(), user.id, new_user.deposit_address);

        next.users.insert(user.id, user.clone());
        next.wallets.insert(wallet.id, wallet.clone());
        self.persist(&next)?;
        *state = next;
        Ok((user, wallet))
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let existing = next
            .users
            .get_mut(&user.id)
            .ok_or_else(|| StoreError::Persistence(format!("user {} not found", user.id)))?;
        // key and referrer are immutable after registration
        existing.lang = user.lang;
        existing.is_frozen = user.is_frozen;
        existing.is_newbie = user.is_newbie;
        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn user_by_key(&self, key: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.key == key)
            .cloned())
    }

    async fn referrals_of(&self, referrer_ids: &[UserId]) -> Result<Vec<User>, StoreError> {
        let wanted: HashSet<UserId> = referrer_ids.iter().copied().collect();
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .filter(|u| u.referrer_id.map_or(false, |r| wanted.contains(&r)))
            .cloned()
            .collect())
    }

    async fn users_with_deposits(&self, user_ids: &[UserId]) -> Result<HashSet<UserId>, StoreError> {
        let state = self.state.read().await;
        let wanted: HashSet<UserId> = user_ids.iter().copied().collect();
        let owners: HashMap<WalletId, UserId> = state
            .wallets
            .values()
            .filter(|w| wanted.contains(&w.user_id))
            .map(|w| (w.id, w.user_id))
            .collect();

        Ok(state
            .transactions
            .values()
            .filter(|tx| tx.tx_type == TxType::Deposit)
            .filter_map(|tx| owners.get(&tx.wallet_id).copied())
            .collect())
    }

    async fn wallet_of(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .wallets
            .values()
            .find(|w| w.user_id == user_id)
            .cloned())
    }

    async fn wallets_holding_alb(&self) -> Result<Vec<WalletId>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .wallets
            .values()
            .filter(|w| w.alb_balance > Decimal::ZERO)
            .map(|w| w.id)
            .collect())
    }

    async fn transaction(&self, id: TxId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }

    async fn deposit_by_hash(&self, hash: &str) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .values()
            .find(|tx| tx.tx_type == TxType::Deposit && tx.hash.as_deref() == Some(hash))
            .cloned())
    }

    async fn matured_locked(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>, StoreError> {
        let mut matured: Vec<Transaction> = self
            .state
            .read()
            .await
            .transactions
            .values()
            .filter(|tx| tx.is_matured(now))
            .cloned()
            .collect();
        matured.sort_by_key(|tx| (tx.locked_until, tx.id));
        Ok(matured)
    }

    async fn transactions(&self, query: &TxQuery) -> Result<Vec<Transaction>, StoreError> {
        let mut rows: Vec<Transaction> = self
            .state
            .read()
            .await
            .transactions
            .values()
            .filter(|tx| tx.wallet_id == query.wallet_id)
            .filter(|tx| query.tx_type.map_or(true, |t| tx.tx_type == t))
            .cloned()
            .collect();

        rows.sort_by_key(|tx| (tx.created_at, tx.id));
        if query.order == SortOrder::Desc {
            rows.reverse();
        }
        Ok(rows.into_iter().skip(query.offset).take(query.limit).collect())
    }

    async fn sum_to_amount(&self, filter: &SumFilter) -> Result<Decimal, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .values()
            .filter(|tx| tx.wallet_id == filter.wallet_id && tx.tx_type == filter.tx_type)
            .filter(|tx| filter.ref_lvl.map_or(true, |lvl| tx.ref_lvl == Some(lvl)))
            .filter(|tx| filter.since.map_or(true, |since| tx.created_at >= since))
            .map(|tx| tx.to_amount)
            .sum())
    }

    async fn begin(&self, wallet_id: WalletId) -> Result<UnitOfWork, StoreError> {
        let lock = self.wallet_lock(wallet_id).lock_owned().await;
        let wallet = self
            .state
            .read()
            .await
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or(StoreError::WalletNotFound(wallet_id))?;
        Ok(UnitOfWork::new(wallet, lock))
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<Committed, StoreError> {
        let (wallet, inserts, updates, _lock) = unit.into_parts();
        let mut state = self.state.write().await;

        if !state.wallets.contains_key(&wallet.id) {
            return Err(StoreError::WalletNotFound(wallet.id));
        }
        if !wallet.is_consistent() {
            return Err(StoreError::NegativeBalance(wallet.id));
        }

        let mut staged_hashes = HashSet::new();
        for tx in inserts.iter().filter(|tx| tx.tx_type == TxType::Deposit) {
            if let Some(hash) = tx.hash.as_deref() {
                if state.has_deposit_hash(hash) || !staged_hashes.insert(hash) {
                    return Err(StoreError::DuplicateHash(hash.to_string()));
                }
            }
        }

        for tx in &updates {
            let existing = state
                .transactions
                .get(&tx.id)
                .ok_or(StoreError::TransactionNotFound(tx.id))?;
            if existing.wallet_id != wallet.id || tx.wallet_id != wallet.id {
                return Err(StoreError::ForeignTransaction {
                    tx: tx.id,
                    wallet: wallet.id,
                });
            }
        }

        let now = Utc::now();
        let mut next = state.clone();
        next.wallets.insert(wallet.id, wallet.clone());
        for tx in updates {
            next.transactions.insert(tx.id, tx);
        }
        let mut inserted = Vec::with_capacity(inserts.len());
        for new_tx in inserts {
            let id = next.next_tx_id();
            let tx = new_tx.into_transaction(id, wallet.id, now);
            next.transactions.insert(id, tx.clone());
            inserted.push(tx);
        }

        self.persist(&next)?;
        *state = next;
        Ok(Committed { wallet, inserted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Lang, NewTransaction, Pool, Token, TxStatus};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn new_user(key: &str, referrer_id: Option<UserId>) -> NewUser {
        NewUser {
            key: key.to_string(),
            referrer_id,
            lang: Lang::En,
            deposit_address: format!("TDeposit{}", key),
        }
    }

    fn deposit(hash: &str) -> NewTransaction {
        NewTransaction::new(TxType::Deposit, TxStatus::Completed, Token::Alt, dec!(10))
            .from(Token::Usdt, dec!(10))
            .hash(hash)
    }

    #[tokio::test]
    async fn test_settings_created_lazily_once() {
        let store = MemoryStore::new();
        let mut settings = store.settings().await.unwrap();
        settings.alb_alt_rate = dec!(0.5);
        store.save_settings(&settings).await.unwrap();

        assert_eq!(store.settings().await.unwrap().alb_alt_rate, dec!(0.5));
    }

    #[tokio::test]
    async fn test_create_user_checks_referrer_and_key() {
        let store = MemoryStore::new();
        let (alice, wallet) = store.create_user(new_user("alice", None)).await.unwrap();
        assert_eq!(wallet.user_id, alice.id);

        assert!(matches!(
            store.create_user(new_user("alice", None)).await,
            Err(StoreError::DuplicateUser(_))
        ));
        assert!(matches!(
            store.create_user(new_user("bob", Some(99))).await,
            Err(StoreError::ReferrerNotFound(99))
        ));

        store.create_user(new_user("bob", Some(alice.id))).await.unwrap();
        let referrals = store.referrals_of(&[alice.id]).await.unwrap();
        assert_eq!(referrals.len(), 1);
        assert_eq!(referrals[0].key, "bob");
    }

    #[tokio::test]
    async fn test_commit_applies_wallet_and_transactions_together() {
        let store = MemoryStore::new();
        let (_, wallet) = store.create_user(new_user("alice", None)).await.unwrap();

        let mut unit = store.begin(wallet.id).await.unwrap();
        unit.wallet_mut().credit(Token::Alt, Pool::Liquid, dec!(10)).unwrap();
        unit.insert(deposit("h1"));
        let committed = store.commit(unit).await.unwrap();

        assert_eq!(committed.wallet.alt_balance, dec!(10));
        assert_eq!(committed.record().unwrap().hash.as_deref(), Some("h1"));
        assert!(store.deposit_by_hash("h1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_deposit_hash_rejected_without_effect() {
        let store = MemoryStore::new();
        let (_, wallet) = store.create_user(new_user("alice", None)).await.unwrap();

        let mut unit = store.begin(wallet.id).await.unwrap();
        unit.wallet_mut().credit(Token::Alt, Pool::Liquid, dec!(10)).unwrap();
        unit.insert(deposit("h1"));
        store.commit(unit).await.unwrap();

        let mut unit = store.begin(wallet.id).await.unwrap();
        unit.wallet_mut().credit(Token::Alt, Pool::Liquid, dec!(10)).unwrap();
        unit.insert(deposit("h1"));
        assert!(matches!(store.commit(unit).await, Err(StoreError::DuplicateHash(_))));

        let after = store.wallet_of(wallet.user_id).await.unwrap().unwrap();
        assert_eq!(after.alt_balance, dec!(10));
    }

    #[tokio::test]
    async fn test_bonus_may_share_deposit_hash() {
        let store = MemoryStore::new();
        let (_, wallet) = store.create_user(new_user("alice", None)).await.unwrap();

        let mut unit = store.begin(wallet.id).await.unwrap();
        unit.insert(deposit("h1"));
        unit.insert(
            NewTransaction::new(TxType::Bonus, TxStatus::Completed, Token::Alt, dec!(1))
                .ref_lvl(1)
                .hash("h1"),
        );
        assert_eq!(store.commit(unit).await.unwrap().inserted.len(), 2);
    }

    #[tokio::test]
    async fn test_negative_balance_rejected() {
        let store = MemoryStore::new();
        let (_, wallet) = store.create_user(new_user("alice", None)).await.unwrap();

        let mut unit = store.begin(wallet.id).await.unwrap();
        unit.wallet_mut().alt_balance = dec!(-1);
        assert!(matches!(store.commit(unit).await, Err(StoreError::NegativeBalance(_))));
    }

    #[tokio::test]
    async fn test_dropped_unit_releases_lock() {
        let store = MemoryStore::new();
        let (_, wallet) = store.create_user(new_user("alice", None)).await.unwrap();

        let unit = store.begin(wallet.id).await.unwrap();
        drop(unit);
        let second = tokio::time::timeout(Duration::from_secs(1), store.begin(wallet.id)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_begin_blocks_while_unit_open() {
        let store = MemoryStore::new();
        let (_, wallet) = store.create_user(new_user("alice", None)).await.unwrap();

        let _held = store.begin(wallet.id).await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), store.begin(wallet.id)).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn test_foreign_transaction_update_rejected() {
        let store = MemoryStore::new();
        let (_, alice) = store.create_user(new_user("alice", None)).await.unwrap();
        let (_, bob) = store.create_user(new_user("bob", None)).await.unwrap();

        let mut unit = store.begin(alice.id).await.unwrap();
        unit.insert(deposit("h1"));
        let tx = store.commit(unit).await.unwrap().inserted.remove(0);

        let mut unit = store.begin(bob.id).await.unwrap();
        unit.update(tx);
        assert!(matches!(
            store.commit(unit).await,
            Err(StoreError::ForeignTransaction { .. })
        ));
    }

    #[tokio::test]
    async fn test_history_paging_and_filters() {
        let store = MemoryStore::new();
        let (_, wallet) = store.create_user(new_user("alice", None)).await.unwrap();

        for i in 0..5 {
            let mut unit = store.begin(wallet.id).await.unwrap();
            unit.insert(deposit(&format!("h{}", i)));
            unit.insert(NewTransaction::new(TxType::Dividends, TxStatus::Completed, Token::Alt, dec!(2)));
            store.commit(unit).await.unwrap();
        }

        let page = store.transactions(&TxQuery::latest(wallet.id, 3)).await.unwrap();
        assert_eq!(page.len(), 3);
        assert!(page[0].id > page[1].id);

        let deposits = store
            .transactions(&TxQuery::latest(wallet.id, 100).of_type(TxType::Deposit))
            .await
            .unwrap();
        assert_eq!(deposits.len(), 5);

        let total = store
            .sum_to_amount(&SumFilter::new(wallet.id, TxType::Dividends))
            .await
            .unwrap();
        assert_eq!(total, dec!(10));
    }

    #[tokio::test]
    async fn test_users_with_deposits() {
        let store = MemoryStore::new();
        let (alice, alice_wallet) = store.create_user(new_user("alice", None)).await.unwrap();
        let (bob, _) = store.create_user(new_user("bob", None)).await.unwrap();

        let mut unit = store.begin(alice_wallet.id).await.unwrap();
        unit.insert(deposit("h1"));
        store.commit(unit).await.unwrap();

        let active = store.users_with_deposits(&[alice.id, bob.id]).await.unwrap();
        assert!(active.contains(&alice.id));
        assert!(!active.contains(&bob.id));
    }
}
