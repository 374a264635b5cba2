//! In-process doubles for the external ports
//!
//! Deterministic stand-ins that record their calls, for integration tests
//! and dry runs without network access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::chain::{ChainOracle, ChainTxInfo, OracleError};
use super::fee_relay::{FeeRelay, GaslessTransfer, RelayAck, RelayError, TransferPermit, TransferSigner};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Oracle answering from a fixed hash -> logs table
#[derive(Debug, Default, Clone)]
pub struct StaticOracle {
    calls: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<HashMap<String, ChainTxInfo>>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the logs returned for a hash
    pub fn with_transaction(self, hash: &str, info: ChainTxInfo) -> Self {
        guard(&self.responses).insert(hash.to_string(), info);
        self
    }

    pub fn get_calls(&self) -> Vec<String> {
        guard(&self.calls).clone()
    }
}

#[async_trait]
impl ChainOracle for StaticOracle {
    async fn transaction_info(&self, hash: &str) -> Result<ChainTxInfo, OracleError> {
        guard(&self.calls).push(hash.to_string());
        guard(&self.responses)
            .get(hash)
            .cloned()
            .ok_or_else(|| OracleError::NotFound(hash.to_string()))
    }
}

/// Relay that rejects the first `failures` submissions, then acknowledges
#[derive(Debug, Default, Clone)]
pub struct ScriptedRelay {
    failures: Arc<Mutex<u32>>,
    submitted: Arc<Mutex<Vec<GaslessTransfer>>>,
}

impl ScriptedRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: u32) -> Self {
        let relay = Self::default();
        *guard(&relay.failures) = times;
        relay
    }

    pub fn submissions(&self) -> Vec<GaslessTransfer> {
        guard(&self.submitted).clone()
    }
}

#[async_trait]
impl FeeRelay for ScriptedRelay {
    async fn fetch_nonce(&self, _address: &str) -> Result<u64, RelayError> {
        Ok(guard(&self.submitted).len() as u64)
    }

    async fn fetch_service_provider(&self) -> Result<String, RelayError> {
        Ok("TKtWbdzEq5ss9vTS9kwRhBp5mXmBfBns3E".to_string())
    }

    async fn submit_gasless_transfer(&self, transfer: &GaslessTransfer) -> Result<RelayAck, RelayError> {
        let mut failures = guard(&self.failures);
        if *failures > 0 {
            *failures -= 1;
            return Err(RelayError::Http("relay unavailable".to_string()));
        }
        let mut submitted = guard(&self.submitted);
        submitted.push(transfer.clone());
        Ok(RelayAck {
            id: format!("relay-{}", submitted.len()),
            state: "WAITING".to_string(),
        })
    }
}

/// Signer returning a fixed signature
#[derive(Debug, Clone)]
pub struct StaticSigner(pub String);

#[async_trait]
impl TransferSigner for StaticSigner {
    async fn sign(&self, _permit: &TransferPermit) -> Result<String, RelayError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::chain::EventLog;

    #[tokio::test]
    async fn test_static_oracle() {
        let info = ChainTxInfo {
            logs: vec![EventLog {
                contract_address: "a614f803b6fd780986a42c78ec9c7f77e6ded13c".into(),
                topics: vec![],
                data: "00".into(),
            }],
        };
        let oracle = StaticOracle::new().with_transaction("h1", info.clone());

        assert_eq!(oracle.transaction_info("h1").await, Ok(info));
        assert!(matches!(oracle.transaction_info("h2").await, Err(OracleError::NotFound(_))));
        assert_eq!(oracle.get_calls(), vec!["h1".to_string(), "h2".to_string()]);
    }

    #[tokio::test]
    async fn test_scripted_relay_fails_then_acks() {
        let relay = ScriptedRelay::failing(1);
        let transfer = GaslessTransfer {
            permit: TransferPermit {
                wallet_address: "TAddr".into(),
                service_provider: "TProv".into(),
                amount: 10,
                max_fee: 1,
                nonce: 0,
                deadline: 0,
            },
            signature: "sig".into(),
        };

        assert!(relay.submit_gasless_transfer(&transfer).await.is_err());
        let ack = relay.submit_gasless_transfer(&transfer).await.unwrap();
        assert_eq!(ack.id, "relay-1");
        assert_eq!(relay.submissions().len(), 1);
    }
}
