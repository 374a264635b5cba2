//! Chain oracle port
//!
//! Looks up a confirmed transaction by hash and returns its event logs
//! exactly as the node reports them (hex strings).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::LedgerError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<OracleError> for LedgerError {
    fn from(err: OracleError) -> Self {
        LedgerError::Oracle(err.to_string())
    }
}

/// One event log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    /// Emitting contract, 20-byte account hex
    #[serde(rename = "address")]
    pub contract_address: String,
    pub topics: Vec<String>,
    /// ABI-encoded payload, hex
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChainTxInfo {
    #[serde(default, rename = "log")]
    pub logs: Vec<EventLog>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainOracle: Send + Sync {
    async fn transaction_info(&self, hash: &str) -> Result<ChainTxInfo, OracleError>;
}
