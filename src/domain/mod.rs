//! Domain Layer - Core ledger types and rules
//!
//! Pure types with no I/O. All storage and chain interactions happen
//! through the ports layer.
//!
//! - `token`: ALT / ALB / USDT and the liquid / locked / dividends pools
//! - `wallet`: balance state, credit/debit primitives, spillover planning
//! - `transaction`: transaction log records and lock release rules
//! - `settings`: the global rates / thresholds / referral tables record
//! - `user`: participants and their referrer links
//! - `address`: Tron base58check codec used for deposit log decoding
//! - `error`: the ledger rejection taxonomy

pub mod address;
pub mod error;
pub mod settings;
pub mod token;
pub mod transaction;
pub mod user;
pub mod wallet;

pub use address::{is_valid_tron_address, tron_address_from_hex, tron_address_from_topic, AddressError};
pub use error::{ErrorKind, LedgerError};
pub use settings::{lock_until, percent_of, ReferralLevel, Settings, REFERRAL_LEVELS};
pub use token::{Pool, Token};
pub use transaction::{NewTransaction, Release, Transaction, TxId, TxStatus, TxType};
pub use user::{Lang, NewUser, User, UserId};
pub use wallet::{SpendOrder, SpendPlan, Wallet, WalletId};
