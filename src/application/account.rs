//! Account operations: registration, profile changes, history and the
//! account summary.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::ledger::Ledger;
use super::referrals::count_referrals;
use crate::domain::{
    is_valid_tron_address, LedgerError, Lang, NewUser, Transaction, TxType, User, Wallet,
    REFERRAL_LEVELS,
};
use crate::ports::{SortOrder, SumFilter, TxQuery};

/// Upper bound on one history page
pub const MAX_HISTORY_LIMIT: usize = 100;
/// Transactions shown in the account summary
pub const SUMMARY_HISTORY_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub user_key: &'a str,
    pub referrer_key: Option<&'a str>,
    pub lang: Lang,
    /// Dedicated chain address provisioned for this user's deposits
    pub deposit_address: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryQuery {
    pub offset: usize,
    pub limit: usize,
    pub order: SortOrder,
    pub tx_type: Option<TxType>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: SUMMARY_HISTORY_LEN,
            order: SortOrder::Desc,
            tx_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balances {
    pub alt: Decimal,
    /// Liquid ALT valued at the current `alt_usdt_rate`
    pub alt_in_usdt: Decimal,
    pub locked_alt: Decimal,
    pub alt_dividends: Decimal,
    pub alb: Decimal,
    pub locked_alb: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Earned {
    /// Current daily income percent
    pub performance: Decimal,
    pub all_time_alt: Decimal,
    pub last_week_alt: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rates {
    pub alb_alt_rate: Decimal,
    pub alt_usdt_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinimalAmounts {
    pub deposit: Decimal,
    pub withdraw: Decimal,
    pub alb_alt: Decimal,
    pub alt_alb: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSummary {
    pub level: u8,
    pub percent: Decimal,
    pub count: usize,
    pub active: usize,
    pub total_bonuses: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralSummary {
    pub count: usize,
    pub active: usize,
    pub total_bonuses: Decimal,
    pub link: String,
    pub levels: Vec<LevelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub user: User,
    pub balances: Balances,
    pub history: Vec<Transaction>,
    pub deposit_address: String,
    pub withdraw_address: Option<String>,
    pub earned: Earned,
    pub rates: Rates,
    pub minimal_amounts: MinimalAmounts,
    pub referrals: ReferralSummary,
}

impl Ledger {
    /// Create a user and wallet. The referrer must already exist, so a new
    /// link can never close a cycle.
    pub async fn register(&self, registration: Registration<'_>) -> Result<(User, Wallet), LedgerError> {
        let user_key = registration.user_key.trim();
        if user_key.is_empty() {
            return Err(LedgerError::InvalidUserKey(registration.user_key.to_string()));
        }
        if !is_valid_tron_address(registration.deposit_address) {
            return Err(LedgerError::InvalidAddress(registration.deposit_address.to_string()));
        }

        let referrer_id = match registration.referrer_key.map(str::trim) {
            Some(referrer_key) if referrer_key == user_key => return Err(LedgerError::SelfReferral),
            Some(referrer_key) => Some(
                self.store
                    .user_by_key(referrer_key)
                    .await?
                    .ok_or_else(|| LedgerError::UserNotFound(referrer_key.to_string()))?
                    .id,
            ),
            None => None,
        };

        let (user, wallet) = self
            .store
            .create_user(NewUser {
                key: user_key.to_string(),
                referrer_id,
                lang: registration.lang,
                deposit_address: registration.deposit_address.to_string(),
            })
            .await?;

        tracing::info!(
            "Registered user {} (id {}, referrer {:?}, wallet {})",
            user.key,
            user.id,
            user.referrer_id,
            wallet.id
        );
        Ok((user, wallet))
    }

    pub async fn change_withdraw_address(&self, user_key: &str, address: &str) -> Result<Wallet, LedgerError> {
        let address = address.trim();
        if !is_valid_tron_address(address) {
            return Err(LedgerError::InvalidAddress(address.to_string()));
        }
        let (_, wallet) = self.active_account(user_key).await?;

        let mut unit = self.store.begin(wallet.id).await?;
        unit.wallet_mut().withdraw_address = Some(address.to_string());
        let committed = self.store.commit(unit).await?;

        tracing::info!("Withdraw address for {} set to {}", user_key, address);
        Ok(committed.wallet)
    }

    pub async fn change_lang(&self, user_key: &str, lang: Lang) -> Result<User, LedgerError> {
        let (mut user, _) = self.active_account(user_key).await?;
        user.lang = lang;
        self.store.update_user(&user).await?;
        Ok(user)
    }

    /// Operator switch; frozen users keep read access only
    pub async fn set_frozen(&self, user_key: &str, frozen: bool) -> Result<User, LedgerError> {
        let (mut user, _) = self.account(user_key).await?;
        user.is_frozen = frozen;
        self.store.update_user(&user).await?;
        tracing::warn!("User {} frozen: {}", user_key, frozen);
        Ok(user)
    }

    pub async fn history(&self, user_key: &str, query: HistoryQuery) -> Result<Vec<Transaction>, LedgerError> {
        let (_, wallet) = self.account(user_key).await?;
        let rows = self
            .store
            .transactions(&TxQuery {
                wallet_id: wallet.id,
                offset: query.offset,
                limit: query.limit.min(MAX_HISTORY_LIMIT),
                order: query.order,
                tx_type: query.tx_type,
            })
            .await?;
        Ok(rows)
    }

    /// Everything the account screen shows, read without locks
    pub async fn me(&self, user_key: &str) -> Result<AccountSummary, LedgerError> {
        let (user, wallet) = self.account(user_key).await?;
        let settings = self.store.settings().await?;

        let history = self
            .store
            .transactions(&TxQuery::latest(wallet.id, SUMMARY_HISTORY_LEN))
            .await?;
        let dividends = SumFilter::new(wallet.id, TxType::Dividends);
        let all_time_alt = self.store.sum_to_amount(&dividends).await?;
        let last_week_alt = self
            .store
            .sum_to_amount(&dividends.since(Utc::now() - Duration::days(7)))
            .await?;
        let total_bonuses = self
            .store
            .sum_to_amount(&SumFilter::new(wallet.id, TxType::Bonus))
            .await?;
        let counts = count_referrals(self.store.as_ref(), user.id).await?;

        let mut levels = Vec::with_capacity(REFERRAL_LEVELS);
        for (index, (rule, count)) in settings.referral_levels.iter().zip(counts.levels.iter()).enumerate() {
            let level = index as u8 + 1;
            let total_bonuses = self
                .store
                .sum_to_amount(&SumFilter::new(wallet.id, TxType::Bonus).level(level))
                .await?;
            levels.push(LevelSummary {
                level,
                percent: rule.bonus_percent,
                count: count.total,
                active: count.active,
                total_bonuses,
            });
        }

        Ok(AccountSummary {
            balances: Balances {
                alt: wallet.alt_balance,
                alt_in_usdt: wallet.alt_balance * settings.alt_usdt_rate,
                locked_alt: wallet.locked_alt_balance,
                alt_dividends: wallet.alt_dividends,
                alb: wallet.alb_balance,
                locked_alb: wallet.locked_alb_balance,
            },
            history,
            deposit_address: wallet.deposit_address.clone(),
            withdraw_address: wallet.withdraw_address.clone(),
            earned: Earned {
                performance: settings.daily_income_alb_percent,
                all_time_alt,
                last_week_alt,
            },
            rates: Rates {
                alb_alt_rate: settings.alb_alt_rate,
                alt_usdt_rate: settings.alt_usdt_rate,
            },
            minimal_amounts: MinimalAmounts {
                deposit: settings.deposit_min_amount,
                withdraw: settings.withdraw_min_amount,
                alb_alt: settings.min_swap_alb_amount,
                alt_alb: settings.min_swap_alt_amount,
            },
            referrals: ReferralSummary {
                count: counts.total,
                active: counts.active,
                total_bonuses,
                link: format!("{}{}", self.referral_link_base, user.key),
                levels,
            },
            user,
        })
    }
}
