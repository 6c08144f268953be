//! Point-for-code exchange against the reward catalog.
//!
//! The account-side unit of work (debit, spent entry, redeemed reward,
//! idempotency record) is applied here to a working copy; the engine pairs it
//! with the catalog slot reservation and the code registry.

use crate::ledger;
use chrono::{DateTime, Utc};
use dinepoints_core::account::{Account, PointsSource, RedeemedReward, RedemptionStatus};
use dinepoints_core::error::{LoyaltyError, LoyaltyResult};
use dinepoints_core::program::{Program, RewardDefinition};
use rand::Rng;
use serde::{Deserialize, Serialize};

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random uppercase alphanumeric code.
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub user_id: String,
    pub reward_id: String,
    /// Client-supplied token; a repeated key returns the first redemption.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemReceipt {
    pub user_id: String,
    pub redemption: RedeemedReward,
    pub new_balance: u64,
    /// True when an earlier redemption was returned for a repeated key.
    pub replayed: bool,
}

/// Redemption preconditions that only depend on the account and program.
pub fn check_eligibility(account: &Account, program: &Program, cost: u64) -> LoyaltyResult<()> {
    if !account.is_active() {
        return Err(LoyaltyError::invalid_state(format!(
            "account {} is {:?}",
            account.user_id, account.status
        )));
    }
    let min = program.settings.min_redemption_points;
    if account.points.current < min {
        return Err(LoyaltyError::invalid_state(format!(
            "redemption requires a balance of at least {min} points"
        )));
    }
    if account.points.current < cost {
        return Err(LoyaltyError::InsufficientPoints {
            required: cost,
            available: account.points.current,
        });
    }
    Ok(())
}

/// Debit the reward cost and record the redemption under `code`.
pub fn apply(
    account: &mut Account,
    program: &Program,
    reward: &RewardDefinition,
    code: &str,
    idempotency_key: Option<&str>,
    now: DateTime<Utc>,
) -> LoyaltyResult<RedeemedReward> {
    check_eligibility(account, program, reward.points_cost)?;

    ledger::debit(
        account,
        reward.points_cost,
        PointsSource::Redemption,
        format!("Redeemed: {}", reward.name),
        Some(reward.id.clone()),
        now,
    )?;

    let redeemed = RedeemedReward {
        reward_id: reward.id.clone(),
        name: reward.name.clone(),
        points_cost: reward.points_cost,
        redeemed_at: now,
        status: RedemptionStatus::Active,
        expires_at: reward.valid_until,
        code: code.to_string(),
    };
    account
        .rewards
        .redeemed
        .insert(code.to_string(), redeemed.clone());
    if let Some(key) = idempotency_key {
        account
            .rewards
            .idempotency_keys
            .insert(key.to_string(), code.to_string());
    }
    Ok(redeemed)
}

/// The redemption previously recorded for `key`, if any.
pub fn replay(account: &Account, key: &str) -> Option<RedeemedReward> {
    let code = account.rewards.idempotency_keys.get(key)?;
    account.rewards.redeemed.get(code).cloned()
}

/// Mark an issued code as used.
pub fn mark_used(account: &mut Account, code: &str, now: DateTime<Utc>) -> LoyaltyResult<RedeemedReward> {
    let redeemed = account
        .rewards
        .redeemed
        .get_mut(code)
        .ok_or_else(|| LoyaltyError::not_found(format!("redemption {code}")))?;
    match redeemed.effective_status(now) {
        RedemptionStatus::Active => {
            redeemed.status = RedemptionStatus::Used;
            Ok(redeemed.clone())
        }
        status => Err(LoyaltyError::invalid_state(format!(
            "redemption {code} is {status:?}"
        ))),
    }
}

/// Reward ids the account can afford right now.
pub fn refresh_available(account: &mut Account, program: &Program, now: DateTime<Utc>) {
    account.rewards.available = program
        .available_rewards(now)
        .into_iter()
        .filter(|r| r.points_cost <= account.points.current)
        .map(|r| r.id.clone())
        .collect();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ledger::Credit;
    use chrono::Duration;
    use dinepoints_core::account::EntryType;

    fn funded(points: u64) -> Account {
        let mut acct = Account::new("u1", "Bronze", 1, Utc::now());
        ledger::credit(&mut acct, Credit::new(points, PointsSource::Booking, "seed"), Utc::now()).unwrap();
        acct
    }

    #[test]
    fn test_generate_code_shape() {
        let code = generate_code(8);
        assert_eq!(code.len(), 8);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_apply_records_spent_entry_and_code() {
        let program = Program::demo();
        let reward = program.rewards["discount-10"].clone();
        let mut acct = funded(600);
        let now = Utc::now();

        let redeemed = apply(&mut acct, &program, &reward, "CODE0001", Some("key-1"), now).unwrap();
        assert_eq!(redeemed.status, RedemptionStatus::Active);
        assert_eq!(acct.points.current, 100);

        let spent = acct.points_history.last().unwrap();
        assert_eq!(spent.entry_type, EntryType::Spent);
        assert_eq!(spent.amount, -500);
        assert_eq!(spent.source_id.as_deref(), Some("discount-10"));
        assert_eq!(acct.rewards.redeemed["CODE0001"].reward_id, "discount-10");
        assert_eq!(replay(&acct, "key-1").unwrap().code, "CODE0001");
    }

    #[test]
    fn test_apply_insufficient_leaves_account_untouched() {
        let program = Program::demo();
        let reward = program.rewards["free-dessert"].clone();
        let mut acct = funded(100);
        let before = acct.points_history.len();

        let err = apply(&mut acct, &program, &reward, "CODE0002", None, Utc::now()).unwrap_err();
        assert!(matches!(err, LoyaltyError::InsufficientPoints { required: 800, available: 100 }));
        assert_eq!(acct.points_history.len(), before);
        assert!(acct.rewards.redeemed.is_empty());
    }

    #[test]
    fn test_min_redemption_balance() {
        let mut program = Program::demo();
        program.settings.min_redemption_points = 1000;
        let mut acct = funded(600);
        let err = check_eligibility(&acct, &program, 500).unwrap_err();
        assert!(matches!(err, LoyaltyError::InvalidState(_)));
        acct.status = dinepoints_core::account::AccountStatus::Suspended;
        assert!(check_eligibility(&acct, &Program::demo(), 500).is_err());
    }

    #[test]
    fn test_mark_used_once() {
        let program = Program::demo();
        let mut reward = program.rewards["discount-10"].clone();
        let mut acct = funded(2000);
        let now = Utc::now();
        apply(&mut acct, &program, &reward, "USEME001", None, now).unwrap();

        assert_eq!(mark_used(&mut acct, "USEME001", now).unwrap().status, RedemptionStatus::Used);
        assert!(matches!(mark_used(&mut acct, "USEME001", now), Err(LoyaltyError::InvalidState(_))));
        assert!(matches!(mark_used(&mut acct, "NOPE", now), Err(LoyaltyError::NotFound(_))));

        reward.valid_until = Some(now + Duration::hours(1));
        apply(&mut acct, &program, &reward, "LATE0001", None, now).unwrap();
        let later = now + Duration::hours(2);
        assert!(matches!(mark_used(&mut acct, "LATE0001", later), Err(LoyaltyError::InvalidState(_))));
    }

    #[test]
    fn test_refresh_available_filters_by_balance() {
        let program = Program::demo();
        let mut acct = funded(900);
        refresh_available(&mut acct, &program, Utc::now());
        assert_eq!(acct.rewards.available, vec!["discount-10".to_string(), "free-dessert".to_string()]);
    }
}
