//! Snapshot persistence
//!
//! The whole ledger state is written as one pretty-printed JSON document.
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.
//!
//! A writable store holds an exclusive advisory lock on `data_dir/ledger.lock`
//! for its whole life, so only one process at a time can commit to a ledger.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::store::{LedgerState, MemoryStore};
use crate::ports::StoreError;

/// Default snapshot file name inside the data directory
pub const SNAPSHOT_FILE: &str = "ledger.json";

/// Advisory lock file next to the snapshot
pub const LOCK_FILE: &str = "ledger.lock";

pub fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SNAPSHOT_FILE)
}

/// Snapshot location owned by exactly one writer
///
/// The lock is released when the file handle is dropped, including when the
/// process dies.
#[derive(Debug)]
pub struct SnapshotFile {
    path: PathBuf,
    _lock: File,
}

impl SnapshotFile {
    /// Take the writer lock on `data_dir`, failing fast when another process holds it
    pub fn acquire(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir)
            .map_err(|e| StoreError::Persistence(format!("create {}: {}", data_dir.display(), e)))?;

        let lock_path = data_dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StoreError::Persistence(format!("open {}: {}", lock_path.display(), e)))?;

        if let Err(e) = lock.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(StoreError::Locked(data_dir.display().to_string()));
            }
            return Err(StoreError::Persistence(format!("lock {}: {}", lock_path.display(), e)));
        }

        tracing::debug!("Acquired ledger lock {}", lock_path.display());
        Ok(Self {
            path: snapshot_path(data_dir),
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerState {
    /// Load a snapshot; a missing or empty file yields `None`
    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::Persistence(format!("read {}: {}", path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        let state: Self = serde_json::from_str(&content)
            .map_err(|e| StoreError::Persistence(format!("corrupted snapshot {}: {}", path.display(), e)))?;

        tracing::info!(
            "Ledger snapshot loaded: {} users, {} wallets, {} transactions",
            state.users.len(),
            state.wallets.len(),
            state.transactions.len()
        );
        Ok(Some(state))
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::Persistence(format!("create {}: {}", parent.display(), e)))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Persistence(format!("serialize: {}", e)))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .map_err(|e| StoreError::Persistence(format!("write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, path)
            .map_err(|e| StoreError::Persistence(format!("rename {}: {}", path.display(), e)))?;

        tracing::debug!("Ledger snapshot saved to {}", path.display());
        Ok(())
    }
}

impl MemoryStore {
    /// Open the ledger in `data_dir` for writing
    ///
    /// Holds the writer lock until the store is dropped and persists the
    /// snapshot inside every mutation.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let file = SnapshotFile::acquire(data_dir)?;
        let state = Self::load_state(file.path())?;
        Ok(Self::from_state(state).with_journal(file))
    }

    /// Read-only view of the last committed snapshot; takes no lock
    ///
    /// Changes made through this store are never written back.
    pub fn open_read_only(data_dir: &Path) -> Result<Self, StoreError> {
        let state = Self::load_state(&snapshot_path(data_dir))?;
        Ok(Self::from_state(state))
    }

    fn load_state(path: &Path) -> Result<LedgerState, StoreError> {
        match LedgerState::load(path)? {
            Some(state) => Ok(state),
            None => {
                tracing::info!("No ledger snapshot at {} - starting empty", path.display());
                Ok(LedgerState::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Lang, NewTransaction, NewUser, Pool, Token, TxStatus, TxType};
    use crate::ports::LedgerStore;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn new_user(key: &str, referrer_id: Option<u64>) -> NewUser {
        NewUser {
            key: key.into(),
            referrer_id,
            lang: Lang::Ru,
            deposit_address: format!("TDeposit{}", key),
        }
    }

    async fn credit_deposit(store: &MemoryStore, wallet_id: u64, hash: &str) {
        let mut unit = store.begin(wallet_id).await.unwrap();
        unit.wallet_mut().credit(Token::Alt, Pool::Liquid, dec!(29.5)).unwrap();
        unit.insert(
            NewTransaction::new(TxType::Deposit, TxStatus::Completed, Token::Alt, dec!(29.5))
                .from(Token::Usdt, dec!(60))
                .hash(hash),
        );
        store.commit(unit).await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let dir = TempDir::new().unwrap();

        let store = MemoryStore::open(dir.path()).unwrap();
        let (user, wallet) = store.create_user(new_user("alice", None)).await.unwrap();
        let mut unit = store.begin(wallet.id).await.unwrap();
        unit.wallet_mut().credit(Token::Alb, Pool::Locked, dec!(12.5)).unwrap();
        store.commit(unit).await.unwrap();
        drop(store);

        let reopened = MemoryStore::open(dir.path()).unwrap();
        let restored = reopened.wallet_of(user.id).await.unwrap().unwrap();
        assert_eq!(restored.locked_alb_balance, dec!(12.5));
        assert_eq!(reopened.user_by_key("alice").await.unwrap().unwrap().lang, Lang::Ru);

        // id sequences continue after reload
        let (bob, _) = reopened.create_user(new_user("bob", Some(user.id))).await.unwrap();
        assert!(bob.id > user.id);
    }

    #[tokio::test]
    async fn test_commit_is_on_disk_before_returning() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        let (_, wallet) = store.create_user(new_user("alice", None)).await.unwrap();
        credit_deposit(&store, wallet.id, "h1").await;

        // still open: nothing else flushes the state
        let on_disk = LedgerState::load(&snapshot_path(dir.path())).unwrap().unwrap();
        assert_eq!(on_disk.wallets[&wallet.id].alt_balance, dec!(29.5));
        assert!(on_disk
            .transactions
            .values()
            .any(|tx| tx.tx_type == TxType::Deposit && tx.hash.as_deref() == Some("h1")));
    }

    #[tokio::test]
    async fn test_second_writer_is_refused_while_ledger_is_open() {
        let dir = TempDir::new().unwrap();
        let scheduler = MemoryStore::open(dir.path()).unwrap();
        let (_, wallet) = scheduler.create_user(new_user("alice", None)).await.unwrap();

        assert!(matches!(MemoryStore::open(dir.path()), Err(StoreError::Locked(_))));

        credit_deposit(&scheduler, wallet.id, "h1").await;
        drop(scheduler);

        // the next writer sees the committed deposit, so the hash stays spent
        let cli = MemoryStore::open(dir.path()).unwrap();
        assert_eq!(cli.wallet_of(wallet.user_id).await.unwrap().unwrap().alt_balance, dec!(29.5));
        assert!(cli.deposit_by_hash("h1").await.unwrap().is_some());

        let mut unit = cli.begin(wallet.id).await.unwrap();
        unit.insert(NewTransaction::new(TxType::Deposit, TxStatus::Completed, Token::Alt, dec!(1)).hash("h1"));
        assert!(matches!(cli.commit(unit).await, Err(StoreError::DuplicateHash(_))));
    }

    #[tokio::test]
    async fn test_read_only_view_does_not_lock_or_write() {
        let dir = TempDir::new().unwrap();
        let writer = MemoryStore::open(dir.path()).unwrap();
        let (user, wallet) = writer.create_user(new_user("alice", None)).await.unwrap();
        credit_deposit(&writer, wallet.id, "h1").await;

        let view = MemoryStore::open_read_only(dir.path()).unwrap();
        assert_eq!(view.wallet_of(user.id).await.unwrap().unwrap().alt_balance, dec!(29.5));

        let mut unit = view.begin(wallet.id).await.unwrap();
        unit.wallet_mut().credit(Token::Alt, Pool::Liquid, dec!(100)).unwrap();
        view.commit(unit).await.unwrap();

        let on_disk = LedgerState::load(&snapshot_path(dir.path())).unwrap().unwrap();
        assert_eq!(on_disk.wallets[&wallet.id].alt_balance, dec!(29.5));
    }

    #[test]
    fn test_missing_snapshot_opens_empty() {
        let dir = TempDir::new().unwrap();
        assert!(LedgerState::load(&snapshot_path(dir.path())).unwrap().is_none());
        assert!(MemoryStore::open(dir.path()).is_ok());
    }

    #[test]
    fn test_corrupted_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = snapshot_path(dir.path());
        fs::write(&path, "{ invalid json }").unwrap();

        assert!(matches!(LedgerState::load(&path), Err(StoreError::Persistence(_))));
        assert!(MemoryStore::open(dir.path()).is_err());
    }
}
