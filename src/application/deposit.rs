//! Deposit Verifier
//!
//! Credits liquid ALT for a stablecoin transfer proven by chain logs.
//! The fee relay sweep runs before the wallet is locked and can only
//! withhold the activation flag, never the credit. The level-1 deposit
//! bonus is committed separately afterwards.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use super::ledger::{ensure_minimum, load_account, ensure_not_frozen};
use super::referrals::{credit_referral_bonus, BonusGrant, BonusOutcome, BonusSource};
use super::retry::RetryPolicy;
use crate::domain::{
    tron_address_from_hex, tron_address_from_topic, LedgerError, NewTransaction, Pool, Token,
    Transaction, TxStatus, TxType, Wallet, address::TRANSFER_EVENT_TOPIC,
};
use crate::ports::{
    ChainOracle, EventLog, FeeRelay, GaslessTransfer, LedgerStore, RelayAck, RelayError,
    TransferPermit, TransferSigner,
};

#[derive(Debug, Clone, PartialEq)]
pub struct DepositConfig {
    /// Stablecoin contract, base58
    pub usdt_contract: String,
    pub usdt_decimals: u32,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            usdt_contract: "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".to_string(),
            usdt_decimals: 6,
        }
    }
}

/// Fee relay wiring for sweeping deposit addresses
#[derive(Clone)]
pub struct FeeSponsor {
    pub relay: Arc<dyn FeeRelay>,
    pub signer: Arc<dyn TransferSigner>,
    pub retry: RetryPolicy,
    /// Relay fee cap in base units for already activated addresses
    pub max_fee_activated: u128,
    pub max_fee_not_activated: u128,
    pub permit_ttl: Duration,
}

impl FeeSponsor {
    pub fn new(relay: Arc<dyn FeeRelay>, signer: Arc<dyn TransferSigner>) -> Self {
        Self {
            relay,
            signer,
            retry: RetryPolicy::default(),
            max_fee_activated: 1_000_000,
            max_fee_not_activated: 2_000_000,
            permit_ttl: Duration::from_secs(180),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_fees(mut self, activated: u128, not_activated: u128) -> Self {
        self.max_fee_activated = activated;
        self.max_fee_not_activated = not_activated;
        self
    }

    fn max_fee(&self, is_activated: bool) -> u128 {
        if is_activated {
            self.max_fee_activated
        } else {
            self.max_fee_not_activated
        }
    }

    async fn transfer_once(&self, address: &str, amount: u128, max_fee: u128) -> Result<RelayAck, RelayError> {
        let nonce = self.relay.fetch_nonce(address).await?;
        let service_provider = self.relay.fetch_service_provider().await?;
        let permit = TransferPermit {
            wallet_address: address.to_string(),
            service_provider,
            amount,
            max_fee,
            nonce,
            deadline: Utc::now().timestamp() + self.permit_ttl.as_secs() as i64,
        };
        let signature = self.signer.sign(&permit).await?;
        self.relay
            .submit_gasless_transfer(&GaslessTransfer { permit, signature })
            .await
    }

    /// Sweep `total` base units out of the wallet's deposit address.
    /// Returns whether the relay acknowledged the transfer.
    pub async fn sweep(&self, wallet: &Wallet, total: u128) -> bool {
        let max_fee = self.max_fee(wallet.is_activated);
        let amount = total.saturating_sub(max_fee);
        if amount == 0 {
            tracing::warn!(
                "Deposit of {} base units does not cover relay fee {} for wallet {}",
                total,
                max_fee,
                wallet.id
            );
            return false;
        }

        let result = self
            .retry
            .run("fee relay transfer", || self.transfer_once(&wallet.deposit_address, amount, max_fee))
            .await;
        match result {
            Ok(ack) => {
                tracing::info!("Relay accepted sweep {} for wallet {} ({})", ack.id, wallet.id, ack.state);
                true
            }
            Err(e) => {
                tracing::warn!(
                    "Relay sweep for wallet {} abandoned: {} - deposit credited without activation",
                    wallet.id,
                    e
                );
                false
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DepositReceipt {
    pub transaction: Transaction,
    pub wallet: Wallet,
    /// Gross verified stablecoin amount
    pub usdt_amount: Decimal,
    /// Whether the relay acknowledged the sweep
    pub sponsored: bool,
    pub bonus: Option<Transaction>,
}

pub struct DepositVerifier {
    store: Arc<dyn LedgerStore>,
    oracle: Arc<dyn ChainOracle>,
    config: DepositConfig,
    sponsor: Option<FeeSponsor>,
}

impl DepositVerifier {
    pub fn new(store: Arc<dyn LedgerStore>, oracle: Arc<dyn ChainOracle>, config: DepositConfig) -> Self {
        Self { store, oracle, config, sponsor: None }
    }

    pub fn with_sponsor(mut self, sponsor: FeeSponsor) -> Self {
        self.sponsor = Some(sponsor);
        self
    }

    pub async fn deposit(&self, user_key: &str, hash: &str) -> Result<DepositReceipt, LedgerError> {
        let hash: String = hash.chars().filter(|c| !c.is_whitespace()).collect();
        if hash.is_empty() {
            return Err(LedgerError::InvalidHash(hash));
        }

        let (user, wallet) = load_account(self.store.as_ref(), user_key).await?;
        ensure_not_frozen(&user)?;
        if self.store.deposit_by_hash(&hash).await?.is_some() {
            return Err(LedgerError::DuplicateDeposit(hash));
        }

        let settings = self.store.settings().await?;
        settings.ensure_rates()?;

        let info = self.oracle.transaction_info(&hash).await?;
        let (total, matched) = self.matching_transfer_total(&info.logs, &wallet.deposit_address);
        if matched == 0 {
            return Err(LedgerError::NoMatchingTransfers);
        }

        let usdt_amount = i128::try_from(total)
            .ok()
            .and_then(|units| Decimal::try_from_i128_with_scale(units, self.config.usdt_decimals).ok())
            .ok_or_else(|| LedgerError::Oracle(format!("transfer amount out of range: {}", total)))?;
        ensure_minimum(usdt_amount, settings.deposit_min_amount)?;

        let net_usdt = usdt_amount - settings.deposit_fee_usdt;
        if net_usdt <= Decimal::ZERO {
            return Err(LedgerError::BelowMinimum {
                amount: usdt_amount,
                minimum: settings.deposit_fee_usdt,
            });
        }
        let alt_amount = net_usdt / settings.alt_usdt_rate;

        // no wallet lock is held while talking to the relay
        let sponsored = match &self.sponsor {
            Some(sponsor) => sponsor.sweep(&wallet, total).await,
            None => {
                tracing::debug!("No fee relay configured - skipping sweep for wallet {}", wallet.id);
                false
            }
        };

        let mut unit = self.store.begin(wallet.id).await?;
        unit.wallet_mut().credit(Token::Alt, Pool::Liquid, alt_amount)?;
        if sponsored && !unit.wallet().is_activated {
            unit.wallet_mut().is_activated = true;
        }
        unit.insert(
            NewTransaction::new(TxType::Deposit, TxStatus::Completed, Token::Alt, alt_amount)
                .from(Token::Usdt, usdt_amount)
                .alt_usdt_rate(settings.alt_usdt_rate)
                .fee_usdt(settings.deposit_fee_usdt)
                .hash(hash.as_str()),
        );

        let committed = self.store.commit(unit).await?;
        let transaction = committed
            .record()
            .cloned()
            .ok_or_else(|| LedgerError::Store("deposit commit returned no record".to_string()))?;
        tracing::info!(
            "Deposit {} USDT -> {} ALT for {} (hash {}, tx {})",
            usdt_amount,
            alt_amount,
            user_key,
            hash,
            transaction.id
        );

        let bonus = match user.referrer_id {
            Some(referrer_id) => self.deposit_bonus(referrer_id, alt_amount, &hash).await,
            None => None,
        };

        Ok(DepositReceipt {
            transaction,
            wallet: committed.wallet,
            usdt_amount,
            sponsored,
            bonus,
        })
    }

    async fn deposit_bonus(&self, referrer_id: u64, alt_amount: Decimal, hash: &str) -> Option<Transaction> {
        let grant = BonusGrant {
            referrer_id,
            level: 1,
            source: BonusSource::Deposit,
            base_amount: alt_amount,
            hash: Some(hash),
        };
        match credit_referral_bonus(self.store.as_ref(), grant).await {
            Ok(BonusOutcome::Credited(tx)) => Some(tx),
            Ok(outcome) => {
                tracing::debug!("Deposit bonus for referrer {} skipped: {:?}", referrer_id, outcome);
                None
            }
            Err(e) => {
                tracing::error!("Deposit bonus for referrer {} failed: {}", referrer_id, e);
                None
            }
        }
    }

    /// Sum of stablecoin transfers into `deposit_address`, in base units,
    /// plus the number of logs that matched
    pub fn matching_transfer_total(&self, logs: &[EventLog], deposit_address: &str) -> (u128, usize) {
        let mut total: u128 = 0;
        let mut matched = 0;
        for log in logs {
            match decode_transfer(log) {
                Some(transfer) if transfer.token == self.config.usdt_contract && transfer.to == deposit_address => {
                    total = total.saturating_add(transfer.amount);
                    matched += 1;
                }
                _ => {}
            }
        }
        (total, matched)
    }
}

/// A decoded TRC-20 `Transfer` event
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    pub token: String,
    pub to: String,
    pub amount: u128,
}

/// Decode a `Transfer(from, to, value)` log; anything else yields `None`
pub fn decode_transfer(log: &EventLog) -> Option<TransferEvent> {
    let signature = log.topics.first()?;
    if !signature.trim_start_matches("0x").eq_ignore_ascii_case(TRANSFER_EVENT_TOPIC) {
        return None;
    }

    let token = tron_address_from_hex(&log.contract_address).ok()?;
    let to = tron_address_from_topic(log.topics.get(2)?).ok()?;
    let amount = parse_amount(&log.data)?;
    Some(TransferEvent { token, to, amount })
}

fn parse_amount(data: &str) -> Option<u128> {
    let digits = data.trim_start_matches("0x").trim_start_matches('0');
    if digits.is_empty() {
        return Some(0);
    }
    if digits.len() > 32 {
        return None;
    }
    u128::from_str_radix(digits, 16).ok()
}
