//! Ledger Settings
//!
//! The single global record of rates, thresholds, cooldowns and referral
//! tables. Operations fetch it at the start of each unit of work and never
//! hold it across a commit boundary.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::error::LedgerError;

/// Depth of the referral bonus cascade
pub const REFERRAL_LEVELS: usize = 5;

/// Bonus rule for one referral level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralLevel {
    /// Percent of the referred wallet's dividend credited to the referrer
    pub bonus_percent: Decimal,
    /// Minimum liquid ALT the referrer must hold to receive the bonus
    pub min_alt_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// ALT received for 1 ALB
    pub alb_alt_rate: Decimal,
    /// USDT received for 1 ALT
    pub alt_usdt_rate: Decimal,

    pub min_swap_alt_amount: Decimal,
    pub min_swap_alb_amount: Decimal,
    /// In USDT
    pub deposit_min_amount: Decimal,
    /// In ALT
    pub withdraw_min_amount: Decimal,

    pub deposit_fee_usdt: Decimal,
    pub withdraw_fee_usdt: Decimal,

    pub alt_alb_cooldown_days: u32,
    pub alb_alt_cooldown_days: u32,
    pub reinvest_cooldown_days: u32,
    /// Minimum gap between two withdrawals of the same wallet (0 disables)
    pub withdraw_cooldown_days: u32,

    pub daily_income_alb_percent: Decimal,
    /// Staged percent rotated in after the next dividend run
    pub future_daily_income_alb_percent: Decimal,

    pub referral_levels: [ReferralLevel; REFERRAL_LEVELS],
    /// Level-1 bonus paid on a referred user's deposit
    pub ref_lvl1_deposit_bonus_percent: Decimal,
}

impl Default for Settings {
    fn default() -> Self {
        let level = |bonus_percent: Decimal| ReferralLevel {
            bonus_percent,
            min_alt_balance: Decimal::ZERO,
        };

        Self {
            alb_alt_rate: dec!(1),
            alt_usdt_rate: dec!(1),
            min_swap_alt_amount: dec!(10),
            min_swap_alb_amount: dec!(10),
            deposit_min_amount: dec!(10),
            withdraw_min_amount: dec!(10),
            deposit_fee_usdt: dec!(1),
            withdraw_fee_usdt: dec!(1),
            alt_alb_cooldown_days: 3,
            alb_alt_cooldown_days: 3,
            reinvest_cooldown_days: 3,
            withdraw_cooldown_days: 0,
            daily_income_alb_percent: dec!(1),
            future_daily_income_alb_percent: dec!(1),
            referral_levels: [
                level(dec!(10)),
                level(dec!(5)),
                level(dec!(3)),
                level(dec!(2)),
                level(dec!(1)),
            ],
            ref_lvl1_deposit_bonus_percent: dec!(5),
        }
    }
}

impl Settings {
    /// Rule for a 1-based referral level
    pub fn referral_level(&self, level: u8) -> Option<&ReferralLevel> {
        if level == 0 {
            return None;
        }
        self.referral_levels.get(level as usize - 1)
    }

    /// Rates must be strictly positive before any division by them
    pub fn ensure_rates(&self) -> Result<(), LedgerError> {
        if self.alb_alt_rate <= Decimal::ZERO {
            return Err(LedgerError::Misconfigured(format!(
                "alb_alt_rate must be > 0, got {}",
                self.alb_alt_rate
            )));
        }
        if self.alt_usdt_rate <= Decimal::ZERO {
            return Err(LedgerError::Misconfigured(format!(
                "alt_usdt_rate must be > 0, got {}",
                self.alt_usdt_rate
            )));
        }
        Ok(())
    }

    /// Apply the staged daily income percent. Returns true when it changed.
    pub fn rotate_daily_income(&mut self) -> bool {
        if self.future_daily_income_alb_percent == self.daily_income_alb_percent {
            return false;
        }
        self.daily_income_alb_percent = self.future_daily_income_alb_percent;
        true
    }
}

/// `now + days`, the release time for a newly locked position
pub fn lock_until(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now + Duration::days(days as i64)
}

/// Percent value applied to an amount (`amount * percent / 100`)
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    amount * percent / dec!(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referral_level_is_one_based() {
        let settings = Settings::default();
        assert!(settings.referral_level(0).is_none());
        assert_eq!(settings.referral_level(1).unwrap().bonus_percent, dec!(10));
        assert_eq!(settings.referral_level(5).unwrap().bonus_percent, dec!(1));
        assert!(settings.referral_level(6).is_none());
    }

    #[test]
    fn test_rotate_daily_income() {
        let mut settings = Settings::default();
        assert!(!settings.rotate_daily_income());

        settings.future_daily_income_alb_percent = dec!(1.5);
        assert!(settings.rotate_daily_income());
        assert_eq!(settings.daily_income_alb_percent, dec!(1.5));
        assert!(!settings.rotate_daily_income());
    }

    #[test]
    fn test_ensure_rates_rejects_zero() {
        let mut settings = Settings::default();
        settings.alb_alt_rate = Decimal::ZERO;
        assert!(matches!(settings.ensure_rates(), Err(LedgerError::Misconfigured(_))));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(dec!(1000), dec!(1)), dec!(10));
        assert_eq!(percent_of(dec!(5), dec!(10)), dec!(0.5));
    }

    #[test]
    fn test_lock_until_adds_days() {
        let now = Utc::now();
        assert_eq!(lock_until(now, 3) - now, Duration::days(3));
        assert_eq!(lock_until(now, 0), now);
    }
}
