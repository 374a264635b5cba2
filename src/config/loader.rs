//! Configuration Loader
//!
//! Loads and validates the service configuration from a TOML file. The
//! ledger's own Settings record is data in the store, not part of this file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::gasfree::GasFreeConfig;
use crate::adapters::tron::TronGridConfig;
use crate::application::{parse_daily_time, DepositConfig, RetryPolicy};
use crate::domain::is_valid_tron_address;

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ledger: LedgerSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
    pub chain: ChainSection,
    #[serde(default)]
    pub fee_relay: FeeRelaySection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Ledger storage section
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSection {
    /// Directory holding the JSON snapshot (`~` is expanded)
    pub data_dir: String,
    /// Prefix of the invite link shown in account summaries
    #[serde(default)]
    pub referral_link_base: String,
}

impl LedgerSection {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).into_owned())
    }
}

/// Background job timing
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSection {
    #[serde(default = "default_settlement_interval")]
    pub settlement_interval_secs: u64,
    /// "HH:MM" in UTC
    #[serde(default = "default_dividend_time")]
    pub dividend_time_utc: String,
}

fn default_settlement_interval() -> u64 {
    60
}

fn default_dividend_time() -> String {
    "00:00".to_string()
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            settlement_interval_secs: default_settlement_interval(),
            dividend_time_utc: default_dividend_time(),
        }
    }
}

/// Chain oracle section
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSection {
    pub api_url: String,
    /// USDT TRC-20 contract, base58
    pub usdt_contract: String,
    #[serde(default = "default_usdt_decimals")]
    pub usdt_decimals: u32,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_usdt_decimals() -> u32 {
    6
}

impl ChainSection {
    /// Get API key with environment variable override
    /// Checks TRONGRID_API_KEY env var first, falls back to config value
    pub fn get_api_key(&self) -> Option<String> {
        env_override("TRONGRID_API_KEY", &self.api_key)
    }

    pub fn oracle_config(&self) -> TronGridConfig {
        TronGridConfig {
            api_url: self.api_url.clone(),
            api_key: self.get_api_key(),
            ..TronGridConfig::default()
        }
    }

    pub fn deposit_config(&self) -> DepositConfig {
        DepositConfig {
            usdt_contract: self.usdt_contract.clone(),
            usdt_decimals: self.usdt_decimals,
        }
    }
}

/// Gasless fee relay section
#[derive(Debug, Clone, Deserialize)]
pub struct FeeRelaySection {
    #[serde(default = "default_fee_relay_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Collection address swept deposits are sent to
    #[serde(default)]
    pub receiver_address: String,
    /// Fee cap in USDT base units for an activated deposit address
    #[serde(default = "default_max_fee_activated")]
    pub max_fee_activated: u64,
    #[serde(default = "default_max_fee_not_activated")]
    pub max_fee_not_activated: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_fee_relay_url() -> String {
    "https://open.gasfree.io".to_string()
}

fn default_max_fee_activated() -> u64 {
    1_000_000
}

fn default_max_fee_not_activated() -> u64 {
    2_000_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    5
}

impl Default for FeeRelaySection {
    fn default() -> Self {
        Self {
            api_url: default_fee_relay_url(),
            api_key: None,
            api_secret: None,
            receiver_address: String::new(),
            max_fee_activated: default_max_fee_activated(),
            max_fee_not_activated: default_max_fee_not_activated(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl FeeRelaySection {
    /// Checks GASFREE_API_KEY env var first, falls back to config value
    pub fn get_api_key(&self) -> Option<String> {
        env_override("GASFREE_API_KEY", &self.api_key)
    }

    /// Checks GASFREE_API_SECRET env var first, falls back to config value
    pub fn get_api_secret(&self) -> Option<String> {
        env_override("GASFREE_API_SECRET", &self.api_secret)
    }

    /// Relay client settings, or `None` when credentials are missing
    pub fn client_config(&self, token: &str) -> Option<GasFreeConfig> {
        let api_key = self.get_api_key()?;
        let api_secret = self.get_api_secret()?;
        Some(GasFreeConfig {
            api_url: self.api_url.clone(),
            api_key: Some(api_key),
            api_secret: Some(api_secret),
            token: token.to_string(),
            receiver: self.receiver_address.clone(),
            ..GasFreeConfig::default()
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.retry_delay_secs))
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn env_override(var: &str, configured: &Option<String>) -> Option<String> {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            return Some(value);
        }
    }
    configured.clone().filter(|value| !value.is_empty())
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "data_dir cannot be empty".to_string(),
            ));
        }

        if self.schedule.settlement_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "settlement_interval_secs must be > 0".to_string(),
            ));
        }

        if parse_daily_time(&self.schedule.dividend_time_utc).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "dividend_time_utc must be HH:MM, got {:?}",
                self.schedule.dividend_time_utc
            )));
        }

        if self.chain.api_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "chain api_url cannot be empty".to_string(),
            ));
        }

        if !is_valid_tron_address(&self.chain.usdt_contract) {
            return Err(ConfigError::ValidationError(format!(
                "usdt_contract is not a Tron address: {}",
                self.chain.usdt_contract
            )));
        }

        if self.chain.usdt_decimals > 18 {
            return Err(ConfigError::ValidationError(format!(
                "usdt_decimals must be 0-18, got {}",
                self.chain.usdt_decimals
            )));
        }

        if self.fee_relay.api_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "fee_relay api_url cannot be empty".to_string(),
            ));
        }

        if self.fee_relay.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "fee_relay max_attempts must be > 0".to_string(),
            ));
        }

        if !self.fee_relay.receiver_address.is_empty()
            && !is_valid_tron_address(&self.fee_relay.receiver_address)
        {
            return Err(ConfigError::ValidationError(format!(
                "receiver_address is not a Tron address: {}",
                self.fee_relay.receiver_address
            )));
        }

        Ok(())
    }

    pub fn settlement_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.settlement_interval_secs)
    }
}
