//! Referral graph: bonus crediting, the dividend cascade, and the
//! level-capped counter used for reporting.

use std::collections::HashSet;

use rust_decimal::Decimal;

use crate::domain::{
    percent_of, LedgerError, NewTransaction, Pool, Token, Transaction, TxStatus, TxType, User,
    UserId, REFERRAL_LEVELS,
};
use crate::ports::LedgerStore;

/// Which percent table a bonus is paid from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusSource {
    /// Per-level dividend cascade table, gated by the level minimum
    Dividend,
    /// Level-1 deposit bonus, ungated
    Deposit,
}

#[derive(Debug, Clone)]
pub struct BonusGrant<'a> {
    pub referrer_id: UserId,
    /// 1-based
    pub level: u8,
    pub source: BonusSource,
    /// ALT amount the percent applies to
    pub base_amount: Decimal,
    pub hash: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BonusOutcome {
    Credited(Transaction),
    /// Referrer's liquid ALT is below the level minimum
    BelowGate,
    /// Referrer has no wallet
    NoWallet,
    /// Percent resolves to nothing for this level
    Zero,
}

/// Credit one referral bonus as its own unit of work on the referrer's wallet
pub async fn credit_referral_bonus(
    store: &dyn LedgerStore,
    grant: BonusGrant<'_>,
) -> Result<BonusOutcome, LedgerError> {
    let settings = store.settings().await?;
    let (percent, minimum) = match grant.source {
        BonusSource::Dividend => match settings.referral_level(grant.level) {
            Some(rule) => (rule.bonus_percent, rule.min_alt_balance),
            None => return Ok(BonusOutcome::Zero),
        },
        BonusSource::Deposit => (settings.ref_lvl1_deposit_bonus_percent, Decimal::ZERO),
    };

    let amount = percent_of(grant.base_amount, percent);
    if amount <= Decimal::ZERO {
        return Ok(BonusOutcome::Zero);
    }

    let Some(wallet) = store.wallet_of(grant.referrer_id).await? else {
        return Ok(BonusOutcome::NoWallet);
    };

    let mut unit = store.begin(wallet.id).await?;
    if unit.wallet().alt_balance < minimum {
        return Ok(BonusOutcome::BelowGate);
    }
    unit.wallet_mut().credit(Token::Alt, Pool::Liquid, amount)?;

    let mut tx = NewTransaction::new(TxType::Bonus, TxStatus::Completed, Token::Alt, amount)
        .from(Token::Usdt, amount * settings.alt_usdt_rate)
        .alt_usdt_rate(settings.alt_usdt_rate)
        .ref_lvl(grant.level);
    if let Some(hash) = grant.hash {
        tx = tx.hash(hash);
    }
    unit.insert(tx);

    let committed = store.commit(unit).await?;
    let transaction = committed
        .record()
        .cloned()
        .ok_or_else(|| LedgerError::Store("bonus commit returned no record".to_string()))?;

    tracing::info!(
        "Referral bonus L{} {} ALT to user {} (tx {})",
        grant.level,
        amount,
        grant.referrer_id,
        transaction.id
    );
    Ok(BonusOutcome::Credited(transaction))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeReport {
    pub credited: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Walk up to five referrers above `origin`, crediting each level's share of
/// `alt_yield`. A missing referrer or failed lookup ends the walk; a missing
/// wallet or unmet gate skips only that level.
pub async fn cascade_dividend_bonus(store: &dyn LedgerStore, origin: &User, alt_yield: Decimal) -> CascadeReport {
    let mut report = CascadeReport::default();
    let mut next = origin.referrer_id;

    for level in 1..=REFERRAL_LEVELS as u8 {
        let Some(referrer_id) = next else {
            break;
        };
        let referrer = match store.user(referrer_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!("Referrer {} of level {} not found - stopping cascade", referrer_id, level);
                break;
            }
            Err(e) => {
                tracing::error!("Referrer {} lookup failed: {} - stopping cascade", referrer_id, e);
                report.failed += 1;
                break;
            }
        };

        let grant = BonusGrant {
            referrer_id,
            level,
            source: BonusSource::Dividend,
            base_amount: alt_yield,
            hash: None,
        };
        match credit_referral_bonus(store, grant).await {
            Ok(BonusOutcome::Credited(_)) => report.credited += 1,
            Ok(outcome) => {
                tracing::debug!("Level {} bonus for user {} skipped: {:?}", level, referrer_id, outcome);
                report.skipped += 1;
            }
            Err(e) => {
                tracing::error!("Level {} bonus for user {} failed: {}", level, referrer_id, e);
                report.failed += 1;
            }
        }

        next = referrer.referrer_id;
    }
    report
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelCount {
    pub total: usize,
    /// Referrals with at least one deposit
    pub active: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferralCount {
    pub total: usize,
    pub active: usize,
    /// Index 0 is level 1; levels past the last non-empty one are zero
    pub levels: [LevelCount; REFERRAL_LEVELS],
}

/// Breadth-first count of the referral tree under `root`, five levels deep.
/// Each level is one batched lookup; users already seen are not revisited.
pub async fn count_referrals(store: &dyn LedgerStore, root: UserId) -> Result<ReferralCount, LedgerError> {
    let mut count = ReferralCount::default();
    let mut seen: HashSet<UserId> = HashSet::from([root]);
    let mut frontier = vec![root];

    for slot in count.levels.iter_mut() {
        let referrals: Vec<UserId> = store
            .referrals_of(&frontier)
            .await?
            .into_iter()
            .map(|u| u.id)
            .filter(|id| seen.insert(*id))
            .collect();
        if referrals.is_empty() {
            break;
        }

        let active = store.users_with_deposits(&referrals).await?;
        *slot = LevelCount {
            total: referrals.len(),
            active: active.len(),
        };
        count.total += slot.total;
        count.active += slot.active;
        frontier = referrals;
    }
    Ok(count)
}
