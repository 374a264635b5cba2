//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Memory: in-process ledger store with per-wallet locks and JSON snapshots
//! - Tron: TronGrid client used as the deposit chain oracle
//! - GasFree: fee relay client that sponsors deposit sweeps
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod gasfree;
pub mod memory;
pub mod tron;

pub use cli::CliApp;
pub use gasfree::GasFreeClient;
pub use memory::MemoryStore;
pub use tron::TronGridOracle;
