//! Tron full-node adapter

pub mod oracle;

pub use oracle::{TronGridConfig, TronGridOracle};
