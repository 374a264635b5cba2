//! Fee relay port
//!
//! Gas-sponsored transfers out of a deposit address. A transfer needs the
//! address nonce, a service provider, and a signature over the permit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RelayError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("relay rejected request: {code} {message}")]
    Rejected { code: i64, message: String },

    #[error("no service provider available")]
    NoProvider,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("missing credentials: {0}")]
    Credentials(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Unsigned transfer authorisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPermit {
    /// Source (deposit) address
    pub wallet_address: String,
    pub service_provider: String,
    /// Stablecoin base units moved to the collection address
    pub amount: u128,
    /// Relay fee cap in base units
    pub max_fee: u128,
    pub nonce: u64,
    /// Unix seconds
    pub deadline: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaslessTransfer {
    pub permit: TransferPermit,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayAck {
    pub id: String,
    pub state: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeeRelay: Send + Sync {
    async fn fetch_nonce(&self, address: &str) -> Result<u64, RelayError>;

    async fn fetch_service_provider(&self) -> Result<String, RelayError>;

    async fn submit_gasless_transfer(&self, transfer: &GaslessTransfer) -> Result<RelayAck, RelayError>;
}

/// Produces the permit signature with the deposit address key
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferSigner: Send + Sync {
    async fn sign(&self, permit: &TransferPermit) -> Result<String, RelayError>;
}

/// Signer used when no key custody is wired in; sponsorship is withheld
#[derive(Debug, Default, Clone)]
pub struct UnconfiguredSigner;

#[async_trait]
impl TransferSigner for UnconfiguredSigner {
    async fn sign(&self, _permit: &TransferPermit) -> Result<String, RelayError> {
        Err(RelayError::Signing("no deposit key custody configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_signer_fails() {
        let permit = TransferPermit {
            wallet_address: "TAddr".into(),
            service_provider: "TProv".into(),
            amount: 1,
            max_fee: 1,
            nonce: 0,
            deadline: 0,
        };
        assert!(matches!(
            UnconfiguredSigner.sign(&permit).await,
            Err(RelayError::Signing(_))
        ));
    }
}
