//! Ledger persistence port
//!
//! Reads are plain point lookups and scans. Every balance mutation goes
//! through a [`UnitOfWork`]: `begin` takes the wallet's exclusive lock and
//! a fresh copy of its row, the operation validates and stages changes,
//! and `commit` applies the wallet row and its transaction writes together
//! or not at all. Dropping a unit without committing rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::domain::{
    LedgerError, NewTransaction, NewUser, Settings, Transaction, TxId, TxType, User, UserId, Wallet,
    WalletId,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("wallet {0} not found")]
    WalletNotFound(WalletId),

    #[error("transaction {0} not found")]
    TransactionNotFound(TxId),

    #[error("transaction {tx} does not belong to wallet {wallet}")]
    ForeignTransaction { tx: TxId, wallet: WalletId },

    #[error("deposit hash already recorded: {0}")]
    DuplicateHash(String),

    #[error("user key already registered: {0}")]
    DuplicateUser(String),

    #[error("referrer {0} not found")]
    ReferrerNotFound(UserId),

    #[error("wallet {0} would hold a negative balance")]
    NegativeBalance(WalletId),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("ledger {0} is in use by another process")]
    Locked(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateHash(hash) => LedgerError::DuplicateDeposit(hash),
            StoreError::DuplicateUser(key) => LedgerError::UserExists(key),
            StoreError::ReferrerNotFound(id) => LedgerError::UserNotFound(id.to_string()),
            StoreError::TransactionNotFound(id) => LedgerError::TransactionNotFound(id),
            other => LedgerError::Store(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Page of a wallet's transactions ordered by creation time
#[derive(Debug, Clone)]
pub struct TxQuery {
    pub wallet_id: WalletId,
    pub offset: usize,
    pub limit: usize,
    pub order: SortOrder,
    pub tx_type: Option<TxType>,
}

impl TxQuery {
    pub fn latest(wallet_id: WalletId, limit: usize) -> Self {
        Self {
            wallet_id,
            offset: 0,
            limit,
            order: SortOrder::Desc,
            tx_type: None,
        }
    }

    pub fn of_type(mut self, tx_type: TxType) -> Self {
        self.tx_type = Some(tx_type);
        self
    }
}

/// Filter for `sum(to_amount)` aggregates
#[derive(Debug, Clone)]
pub struct SumFilter {
    pub wallet_id: WalletId,
    pub tx_type: TxType,
    pub ref_lvl: Option<u8>,
    pub since: Option<DateTime<Utc>>,
}

impl SumFilter {
    pub fn new(wallet_id: WalletId, tx_type: TxType) -> Self {
        Self {
            wallet_id,
            tx_type,
            ref_lvl: None,
            since: None,
        }
    }

    pub fn level(mut self, level: u8) -> Self {
        self.ref_lvl = Some(level);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }
}

/// Staged mutations against one locked wallet
#[derive(Debug)]
pub struct UnitOfWork {
    wallet: Wallet,
    inserts: Vec<NewTransaction>,
    updates: Vec<Transaction>,
    _lock: OwnedMutexGuard<()>,
}

impl UnitOfWork {
    pub fn new(wallet: Wallet, lock: OwnedMutexGuard<()>) -> Self {
        Self {
            wallet,
            inserts: Vec::new(),
            updates: Vec::new(),
            _lock: lock,
        }
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn wallet_mut(&mut self) -> &mut Wallet {
        &mut self.wallet
    }

    pub fn insert(&mut self, tx: NewTransaction) {
        self.inserts.push(tx);
    }

    pub fn update(&mut self, tx: Transaction) {
        self.updates.push(tx);
    }

    /// Split for the store's commit; the lock guard travels with the parts
    /// so it is released only after the commit finishes.
    pub fn into_parts(self) -> (Wallet, Vec<NewTransaction>, Vec<Transaction>, OwnedMutexGuard<()>) {
        (self.wallet, self.inserts, self.updates, self._lock)
    }
}

/// Result of a successful commit
#[derive(Debug, Clone)]
pub struct Committed {
    pub wallet: Wallet,
    pub inserted: Vec<Transaction>,
}

impl Committed {
    /// The first inserted transaction, the audit record of single-write operations
    pub fn record(&self) -> Option<&Transaction> {
        self.inserted.first()
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// The settings singleton, created with defaults on first access
    async fn settings(&self) -> Result<Settings, StoreError>;

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;

    /// Create a user and its wallet together
    async fn create_user(&self, new_user: NewUser) -> Result<(User, Wallet), StoreError>;

    /// Update mutable profile fields (lang, frozen, newbie)
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn user_by_key(&self, key: &str) -> Result<Option<User>, StoreError>;

    /// Direct referrals of every user in `referrer_ids`, in one lookup
    async fn referrals_of(&self, referrer_ids: &[UserId]) -> Result<Vec<User>, StoreError>;

    /// Subset of `user_ids` whose wallet has at least one DEPOSIT
    async fn users_with_deposits(&self, user_ids: &[UserId]) -> Result<HashSet<UserId>, StoreError>;

    async fn wallet_of(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError>;

    /// Wallets whose liquid ALB balance is positive
    async fn wallets_holding_alb(&self) -> Result<Vec<WalletId>, StoreError>;

    async fn transaction(&self, id: TxId) -> Result<Option<Transaction>, StoreError>;

    async fn deposit_by_hash(&self, hash: &str) -> Result<Option<Transaction>, StoreError>;

    /// Locked transactions with `locked_until <= now`
    async fn matured_locked(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>, StoreError>;

    async fn transactions(&self, query: &TxQuery) -> Result<Vec<Transaction>, StoreError>;

    async fn sum_to_amount(&self, filter: &SumFilter) -> Result<Decimal, StoreError>;

    /// Lock the wallet and open a unit of work on a fresh copy of it
    async fn begin(&self, wallet_id: WalletId) -> Result<UnitOfWork, StoreError>;

    /// Apply a unit atomically
    async fn commit(&self, unit: UnitOfWork) -> Result<Committed, StoreError>;
}
