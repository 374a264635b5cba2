//! AltYield - Dual-token ALT/ALB Ledger Library
//!
//! Swaps between a liquid token (ALT) and a yield-bearing token (ALB) with
//! lock periods, USDT deposits verified on Tron, withdrawals, reinvestment,
//! daily dividends and a five-level referral bonus cascade.
//!
//! # Modules
//!
//! - `domain`: Core ledger types and rules (Wallet, Transaction, Settings)
//! - `ports`: Trait abstractions (LedgerStore, ChainOracle, FeeRelay)
//! - `adapters`: External implementations (memory store, TronGrid, GasFree, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Ledger operations and scheduled jobs

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
