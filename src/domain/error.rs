//! Ledger Errors
//!
//! Every rejection a ledger operation can produce. Rejections are raised
//! before any mutation is staged, so an error never implies partial state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use super::token::{Pool, Token};

/// Coarse classification used by callers to map errors onto responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input: token pair, amount, stale rate, malformed address
    Validation,
    /// Missing user, wallet or transaction
    NotFound,
    /// State precondition not met (duplicate hash, frozen account, cooldown)
    Precondition,
    /// Hard insufficiency or funds held in a locked pool
    InsufficientFunds,
    /// Chain oracle or fee relay failure
    External,
    /// Storage or configuration failure
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("wrong tokens: {from} -> {to}")]
    WrongTokenPair { from: Token, to: Token },

    #[error("less than min amount: {amount} < {minimum}")]
    BelowMinimum { amount: Decimal, minimum: Decimal },

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("rate refresh: declared {declared}, current {current}")]
    RateMismatch { declared: Decimal, current: Decimal },

    #[error("is not valid address: {0}")]
    InvalidAddress(String),

    #[error("pool {pool} does not exist for {token}")]
    InvalidPool { token: Token, pool: Pool },

    #[error("amount {0} cannot be credited")]
    InvalidCredit(Decimal),

    #[error("invalid transaction hash: {0:?}")]
    InvalidHash(String),

    #[error("deposit has no matching transfer logs")]
    NoMatchingTransfers,

    #[error("invalid user key: {0:?}")]
    InvalidUserKey(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("wallet not found for user {0}")]
    WalletNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(u64),

    #[error("transaction exists: {0}")]
    DuplicateDeposit(String),

    #[error("user already registered: {0}")]
    UserExists(String),

    #[error("user cannot refer themselves")]
    SelfReferral,

    #[error("account is frozen")]
    AccountFrozen,

    #[error("withdraw address is not set")]
    WithdrawAddressMissing,

    #[error("withdraw cooldown active until {0}")]
    WithdrawCooldown(DateTime<Utc>),

    #[error("insufficient balance: {token} available {available}, requested {requested}")]
    InsufficientFunds {
        token: Token,
        available: Decimal,
        requested: Decimal,
    },

    #[error("locked:{total_with_locked}")]
    FundsLocked {
        token: Token,
        locked: Decimal,
        total_with_locked: Decimal,
        requested: Decimal,
    },

    #[error("settings misconfigured: {0}")]
    Misconfigured(String),

    #[error("chain oracle error: {0}")]
    Oracle(String),

    #[error("fee relay error: {0}")]
    Relay(String),

    #[error("store error: {0}")]
    Store(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            WrongTokenPair { .. }
            | BelowMinimum { .. }
            | NonPositiveAmount(_)
            | RateMismatch { .. }
            | InvalidAddress(_)
            | InvalidPool { .. }
            | InvalidCredit(_)
            | InvalidHash(_)
            | InvalidUserKey(_)
            | NoMatchingTransfers => ErrorKind::Validation,
            UserNotFound(_) | WalletNotFound(_) | TransactionNotFound(_) => ErrorKind::NotFound,
            DuplicateDeposit(_)
            | UserExists(_)
            | SelfReferral
            | AccountFrozen
            | WithdrawAddressMissing
            | WithdrawCooldown(_) => ErrorKind::Precondition,
            InsufficientFunds { .. } | FundsLocked { .. } => ErrorKind::InsufficientFunds,
            Oracle(_) | Relay(_) => ErrorKind::External,
            Misconfigured(_) | Store(_) => ErrorKind::Internal,
        }
    }

    /// Locked amount surfaced to the caller when funds exist but are on hold
    pub fn locked_amount(&self) -> Option<Decimal> {
        match self {
            LedgerError::FundsLocked { locked, .. } => Some(*locked),
            _ => None,
        }
    }
}
