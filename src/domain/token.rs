//! Tokens and balance pools

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Token carried by a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Token {
    /// Liquid internal token
    Alt,
    /// Yield-bearing internal token
    Alb,
    /// External stablecoin (never held in a wallet pool)
    Usdt,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Alt => write!(f, "ALT"),
            Token::Alb => write!(f, "ALB"),
            Token::Usdt => write!(f, "USDT"),
        }
    }
}

impl FromStr for Token {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALT" => Ok(Token::Alt),
            "ALB" => Ok(Token::Alb),
            "USDT" => Ok(Token::Usdt),
            other => Err(format!("unknown token: {}", other)),
        }
    }
}

/// Balance pool inside a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    /// Immediately spendable
    Liquid,
    /// Held under a cooldown until settlement
    Locked,
    /// Accrued yield (ALT only)
    Dividends,
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pool::Liquid => write!(f, "liquid"),
            Pool::Locked => write!(f, "locked"),
            Pool::Dividends => write!(f, "dividends"),
        }
    }
}
