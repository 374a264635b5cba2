//! TronGrid chain oracle
//!
//! Fetches confirmed transaction info over the full-node HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::ports::chain::{ChainOracle, ChainTxInfo, EventLog, OracleError};

#[derive(Debug, Clone)]
pub struct TronGridConfig {
    pub api_url: String,
    /// Sent as `TRON-PRO-API-KEY` when present
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for TronGridConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.trongrid.io".to_string(),
            api_key: None,
            timeout: Duration::from_secs(15),
        }
    }
}

/// Raw `gettransactioninfobyid` body; an unknown hash yields `{}`
#[derive(Debug, Deserialize)]
struct TransactionInfoResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    log: Vec<EventLog>,
}

impl TransactionInfoResponse {
    fn into_info(self, hash: &str) -> Result<ChainTxInfo, OracleError> {
        match self.id {
            Some(_) => Ok(ChainTxInfo { logs: self.log }),
            None => Err(OracleError::NotFound(hash.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TronGridOracle {
    config: TronGridConfig,
    http: Client,
}

impl TronGridOracle {
    pub fn with_config(config: TronGridConfig) -> Result<Self, OracleError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OracleError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }
}

#[async_trait]
impl ChainOracle for TronGridOracle {
    async fn transaction_info(&self, hash: &str) -> Result<ChainTxInfo, OracleError> {
        let url = format!("{}/wallet/gettransactioninfobyid", self.config.api_url.trim_end_matches('/'));

        let mut req = self.http.post(&url).json(&json!({ "value": hash }));
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("TRON-PRO-API-KEY", api_key);
        }

        let response = req.send().await.map_err(|e| OracleError::Http(e.to_string()))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::Http("Rate limit exceeded".into()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(OracleError::Http(format!("API error {}: {}", status, error_text)));
        }

        let body: TransactionInfoResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Decode(format!("Failed to parse response: {}", e)))?;

        tracing::debug!("Fetched transaction info for {} ({} logs)", hash, body.log.len());
        body.into_info(hash)
    }
}
