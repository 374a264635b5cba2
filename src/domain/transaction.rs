//! Transaction Log records
//!
//! Transactions are appended inside the same unit of work as their wallet
//! mutation. Only the status and lock fields change afterwards, and only
//! once, when the settlement job releases a matured lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::token::Token;
use super::wallet::WalletId;

pub type TxId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxType {
    Deposit,
    Withdraw,
    Swap,
    Reinvest,
    Dividends,
    Bonus,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxType::Deposit => "DEPOSIT",
            TxType::Withdraw => "WITHDRAW",
            TxType::Swap => "SWAP",
            TxType::Reinvest => "REINVEST",
            TxType::Dividends => "DIVIDENDS",
            TxType::Bonus => "BONUS",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEPOSIT" => Ok(TxType::Deposit),
            "WITHDRAW" => Ok(TxType::Withdraw),
            "SWAP" => Ok(TxType::Swap),
            "REINVEST" => Ok(TxType::Reinvest),
            "DIVIDENDS" => Ok(TxType::Dividends),
            "BONUS" => Ok(TxType::Bonus),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxStatus {
    Pending,
    Frozen,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub wallet_id: WalletId,
    pub tx_type: TxType,
    pub status: TxStatus,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub from_token: Option<Token>,
    pub from_amount: Option<Decimal>,
    pub to_token: Token,
    /// Amount credited to the pool named by `to_token` at creation
    pub to_amount: Decimal,
    pub alb_alt_rate: Option<Decimal>,
    pub alt_usdt_rate: Option<Decimal>,
    /// Referral level (1-5), BONUS only
    pub ref_lvl: Option<u8>,
    /// External dedup key
    pub hash: Option<String>,
    pub fee_usdt: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// What the settlement job does with a matured locked transaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Release {
    /// Move `amount` of `token` from its locked pool to its liquid pool
    Unlock { token: Token, amount: Decimal },
    /// Clear the lock and park the transaction as PENDING without moving funds
    Park,
}

impl Transaction {
    /// Locked and due at `now`
    pub fn is_matured(&self, now: DateTime<Utc>) -> bool {
        self.is_locked && self.locked_until.map_or(false, |until| until <= now)
    }

    pub fn release(&self) -> Release {
        match (self.tx_type, self.to_token) {
            (TxType::Swap, Token::Alb) | (TxType::Swap, Token::Alt) | (TxType::Reinvest, Token::Alb) => {
                Release::Unlock {
                    token: self.to_token,
                    amount: self.to_amount,
                }
            }
            _ => Release::Park,
        }
    }

    /// Clear the lock fields and set the terminal status
    pub fn settle(&mut self, status: TxStatus) {
        self.is_locked = false;
        self.locked_until = None;
        self.status = status;
    }
}

/// A transaction staged for insertion; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub tx_type: TxType,
    pub status: TxStatus,
    pub locked_until: Option<DateTime<Utc>>,
    pub from_token: Option<Token>,
    pub from_amount: Option<Decimal>,
    pub to_token: Token,
    pub to_amount: Decimal,
    pub alb_alt_rate: Option<Decimal>,
    pub alt_usdt_rate: Option<Decimal>,
    pub ref_lvl: Option<u8>,
    pub hash: Option<String>,
    pub fee_usdt: Option<Decimal>,
}

impl NewTransaction {
    pub fn new(tx_type: TxType, status: TxStatus, to_token: Token, to_amount: Decimal) -> Self {
        Self {
            tx_type,
            status,
            locked_until: None,
            from_token: None,
            from_amount: None,
            to_token,
            to_amount,
            alb_alt_rate: None,
            alt_usdt_rate: None,
            ref_lvl: None,
            hash: None,
            fee_usdt: None,
        }
    }

    pub fn from(mut self, token: Token, amount: Decimal) -> Self {
        self.from_token = Some(token);
        self.from_amount = Some(amount);
        self
    }

    pub fn locked_until(mut self, until: DateTime<Utc>) -> Self {
        self.locked_until = Some(until);
        self
    }

    pub fn alb_alt_rate(mut self, rate: Decimal) -> Self {
        self.alb_alt_rate = Some(rate);
        self
    }

    pub fn alt_usdt_rate(mut self, rate: Decimal) -> Self {
        self.alt_usdt_rate = Some(rate);
        self
    }

    pub fn ref_lvl(mut self, level: u8) -> Self {
        self.ref_lvl = Some(level);
        self
    }

    pub fn hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn fee_usdt(mut self, fee: Decimal) -> Self {
        self.fee_usdt = Some(fee);
        self
    }

    /// Materialize with the id and timestamp assigned at commit
    pub fn into_transaction(self, id: TxId, wallet_id: WalletId, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            wallet_id,
            tx_type: self.tx_type,
            status: self.status,
            is_locked: self.locked_until.is_some(),
            locked_until: self.locked_until,
            from_token: self.from_token,
            from_amount: self.from_amount,
            to_token: self.to_token,
            to_amount: self.to_amount,
            alb_alt_rate: self.alb_alt_rate,
            alt_usdt_rate: self.alt_usdt_rate,
            ref_lvl: self.ref_lvl,
            hash: self.hash,
            fee_usdt: self.fee_usdt,
            created_at,
        }
    }
}
