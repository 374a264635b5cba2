//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Ledger persistence and atomic units of work
//! - The chain oracle used to verify deposits
//! - The fee relay that sponsors transfers out of deposit addresses

pub mod chain;
pub mod fee_relay;
pub mod mocks;
pub mod store;

pub use chain::{ChainOracle, ChainTxInfo, EventLog, OracleError};
pub use fee_relay::{
    FeeRelay, GaslessTransfer, RelayAck, RelayError, TransferPermit, TransferSigner, UnconfiguredSigner,
};
pub use store::{Committed, LedgerStore, SortOrder, StoreError, SumFilter, TxQuery, UnitOfWork};
