//! In-memory ledger store with write-through JSON snapshots

pub mod snapshot;
pub mod store;

pub use snapshot::{snapshot_path, SnapshotFile, LOCK_FILE, SNAPSHOT_FILE};
pub use store::{LedgerState, MemoryStore};
