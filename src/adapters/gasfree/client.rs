//! GasFree API Client
//!
//! Gas-sponsored TRC-20 transfers. Every request is authenticated with an
//! HMAC-SHA256 signature over `METHOD + path + timestamp`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::ports::fee_relay::{FeeRelay, GaslessTransfer, RelayAck, RelayError};

type HmacSha256 = Hmac<Sha256>;

const ADDRESS_PATH: &str = "/tron/api/v1/address";
const PROVIDERS_PATH: &str = "/tron/api/v1/config/provider/all";
const SUBMIT_PATH: &str = "/tron/api/v1/gasfree/submit";

#[derive(Debug, Clone)]
pub struct GasFreeConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// TRC-20 contract moved by the relay (base58)
    pub token: String,
    /// Collection address receiving swept deposits (base58)
    pub receiver: String,
    pub timeout: Duration,
}

impl Default for GasFreeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://open.gasfree.io".to_string(),
            api_key: None,
            api_secret: None,
            token: "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".to_string(),
            receiver: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Common response wrapper
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<T, RelayError> {
        if self.code != 200 {
            let message = self
                .message
                .or(self.reason)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(RelayError::Rejected { code: self.code, message });
        }
        self.data
            .ok_or_else(|| RelayError::Decode("response without data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressInfo {
    nonce: u64,
    #[serde(default)]
    active: bool,
}

#[derive(Debug, Deserialize)]
struct ProviderList {
    #[serde(default)]
    providers: Vec<Provider>,
}

#[derive(Debug, Deserialize)]
struct Provider {
    address: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    token: &'a str,
    service_provider: &'a str,
    user: &'a str,
    receiver: &'a str,
    value: String,
    max_fee: String,
    deadline: i64,
    version: u8,
    nonce: u64,
    sig: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
    state: String,
}

/// Signature over `METHOD + path + timestamp`, base64 encoded
pub fn sign_request(secret: &str, method: &str, path: &str, timestamp: i64) -> Result<String, RelayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| RelayError::Credentials(format!("invalid api secret: {}", e)))?;
    mac.update(format!("{}{}{}", method, path, timestamp).as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone)]
pub struct GasFreeClient {
    config: GasFreeConfig,
    http: Client,
}

impl GasFreeClient {
    pub fn with_config(config: GasFreeConfig) -> Result<Self, RelayError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RelayError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    fn credentials(&self) -> Result<(&str, &str), RelayError> {
        match (self.config.api_key.as_deref(), self.config.api_secret.as_deref()) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => Ok((key, secret)),
            _ => Err(RelayError::Credentials("GasFree api key/secret not set".to_string())),
        }
    }

    fn signed(&self, method: Method, path: &str) -> Result<RequestBuilder, RelayError> {
        let (key, secret) = self.credentials()?;
        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign_request(secret, method.as_str(), path, timestamp)?;
        let url = format!("{}{}", self.config.api_url.trim_end_matches('/'), path);

        Ok(self
            .http
            .request(method, url)
            .header("Timestamp", timestamp.to_string())
            .header("Authorization", format!("ApiKey {}:{}", key, signature)))
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RelayError> {
        let response = request.send().await.map_err(|e| RelayError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RelayError::Http(format!("API error {}: {}", status, error_text)));
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| RelayError::Decode(format!("Failed to parse response: {}", e)))?;
        envelope.into_data()
    }
}

#[async_trait]
impl FeeRelay for GasFreeClient {
    async fn fetch_nonce(&self, address: &str) -> Result<u64, RelayError> {
        let path = format!("{}/{}", ADDRESS_PATH, address);
        let info: AddressInfo = self.call(self.signed(Method::GET, &path)?).await?;
        tracing::debug!("GasFree nonce for {}: {} (active: {})", address, info.nonce, info.active);
        Ok(info.nonce)
    }

    async fn fetch_service_provider(&self) -> Result<String, RelayError> {
        let list: ProviderList = self.call(self.signed(Method::GET, PROVIDERS_PATH)?).await?;
        let provider = list.providers.into_iter().next().ok_or(RelayError::NoProvider)?;
        tracing::debug!(
            "GasFree service provider: {} ({})",
            provider.address,
            provider.name.as_deref().unwrap_or("unnamed")
        );
        Ok(provider.address)
    }

    async fn submit_gasless_transfer(&self, transfer: &GaslessTransfer) -> Result<RelayAck, RelayError> {
        if self.config.receiver.is_empty() {
            return Err(RelayError::Credentials("GasFree receiver address not set".to_string()));
        }
        let permit = &transfer.permit;
        let body = SubmitRequest {
            token: &self.config.token,
            service_provider: &permit.service_provider,
            user: &permit.wallet_address,
            receiver: &self.config.receiver,
            value: permit.amount.to_string(),
            max_fee: permit.max_fee.to_string(),
            deadline: permit.deadline,
            version: 1,
            nonce: permit.nonce,
            sig: &transfer.signature,
        };

        let ack: SubmitResponse = self
            .call(self.signed(Method::POST, SUBMIT_PATH)?.json(&body))
            .await?;
        tracing::info!("GasFree transfer submitted: {} ({})", ack.id, ack.state);
        Ok(RelayAck { id: ack.id, state: ack.state })
    }
}
