//! Daily and weekly challenges: pending → completed → claimed.
//!
//! Progress is clamped at the target. A claim flips `claimed` and credits the
//! reward on the same working copy, so the engine commits both or neither.

use crate::ledger::{self, Credit};
use chrono::{DateTime, Utc};
use dinepoints_core::account::{Account, ActivityKind, ChallengeInstance, ChallengePeriod, PointsSource};
use dinepoints_core::error::{LoyaltyError, LoyaltyResult};
use dinepoints_core::program::{ChallengeTemplate, Program};
use tracing::info;

const PERIODS: [ChallengePeriod; 2] = [ChallengePeriod::Daily, ChallengePeriod::Weekly];

fn instantiate(template: &ChallengeTemplate, period: ChallengePeriod, now: DateTime<Utc>) -> ChallengeInstance {
    ChallengeInstance {
        challenge_id: template.id.clone(),
        name: template.name.clone(),
        activity: template.activity,
        period,
        period_start: period.start_for(now),
        target: template.target,
        progress: 0,
        completed: false,
        points_reward: template.points_reward,
        claimed: false,
        completed_at: None,
        claimed_at: None,
    }
}

/// Instantiate the program's templates for the current periods. Instances
/// already seeded for the same period are left untouched; stale ones are
/// replaced. Returns how many instances were created.
pub fn assign(account: &mut Account, program: &Program, now: DateTime<Utc>) -> usize {
    let mut created = 0;
    for period in PERIODS {
        let templates = match period {
            ChallengePeriod::Daily => &program.gamification.daily_challenges,
            ChallengePeriod::Weekly => &program.gamification.weekly_challenges,
        };
        let start = period.start_for(now);
        let slot = account.challenges.slot_mut(period);
        for template in templates {
            let current = slot
                .get(&template.id)
                .is_some_and(|c| c.period_start == start);
            if !current {
                slot.insert(template.id.clone(), instantiate(template, period, now));
                created += 1;
            }
        }
    }
    created
}

/// Advance every current-period, not yet completed instance tracking
/// `activity`. Returns ids of instances completed by this call.
pub fn record_progress(
    account: &mut Account,
    activity: ActivityKind,
    amount: u32,
    now: DateTime<Utc>,
) -> LoyaltyResult<Vec<String>> {
    if amount == 0 {
        return Err(LoyaltyError::validation("progress amount must be positive"));
    }
    let mut completed = Vec::new();
    for period in PERIODS {
        let start = period.start_for(now);
        for instance in account.challenges.slot_mut(period).values_mut() {
            if instance.activity != activity || instance.period_start != start || instance.completed {
                continue;
            }
            instance.progress = instance.progress.saturating_add(amount).min(instance.target);
            if instance.progress >= instance.target {
                instance.completed = true;
                instance.completed_at = Some(now);
                completed.push(instance.challenge_id.clone());
            }
        }
    }
    if !completed.is_empty() {
        info!(user_id = %account.user_id, challenges = ?completed, "Challenges completed");
    }
    Ok(completed)
}

/// Claim a completed challenge. Returns the points credited.
pub fn claim(
    account: &mut Account,
    challenge_id: &str,
    period: ChallengePeriod,
    now: DateTime<Utc>,
) -> LoyaltyResult<u64> {
    let instance = account
        .challenges
        .slot_mut(period)
        .get_mut(challenge_id)
        .ok_or_else(|| LoyaltyError::not_found(format!("{period:?} challenge {challenge_id}")))?;

    if instance.claimed {
        return Err(LoyaltyError::AlreadyClaimed(format!("challenge {challenge_id}")));
    }
    if !instance.completed {
        return Err(LoyaltyError::invalid_state(format!(
            "challenge {challenge_id} is not completed ({}/{})",
            instance.progress, instance.target
        )));
    }

    instance.claimed = true;
    instance.claimed_at = Some(now);
    let reward = instance.points_reward;
    let source_id = format!("{}:{}", instance.challenge_id, instance.period_start);
    let description = format!("Challenge completed: {}", instance.name);

    if reward > 0 {
        ledger::credit(
            account,
            Credit::new(reward, PointsSource::Challenge, description).source_id(source_id),
            now,
        )?;
    }
    Ok(reward)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn program() -> Program {
        let mut program = Program::demo();
        program.gamification.daily_challenges = vec![ChallengeTemplate {
            id: "daily-reviews".into(),
            name: "Three reviews".into(),
            activity: ActivityKind::Review,
            target: 3,
            points_reward: 75,
        }];
        program
    }

    fn seeded() -> (Account, DateTime<Utc>) {
        let now = Utc::now();
        let mut acct = Account::new("u1", "Bronze", 1, now);
        assert_eq!(assign(&mut acct, &program(), now), 2);
        (acct, now)
    }

    #[test]
    fn test_assign_is_idempotent_within_period() {
        let (mut acct, now) = seeded();
        acct.challenges.daily.get_mut("daily-reviews").unwrap().progress = 1;
        assert_eq!(assign(&mut acct, &program(), now), 0);
        assert_eq!(acct.challenges.daily["daily-reviews"].progress, 1);

        let tomorrow = now + Duration::days(1);
        assert!(assign(&mut acct, &program(), tomorrow) >= 1);
        assert_eq!(acct.challenges.daily["daily-reviews"].progress, 0);
    }

    #[test]
    fn test_progress_completes_and_clamps() {
        let (mut acct, now) = seeded();
        assert!(record_progress(&mut acct, ActivityKind::Review, 1, now).unwrap().is_empty());
        let done = record_progress(&mut acct, ActivityKind::Review, 5, now).unwrap();
        assert_eq!(done, vec!["daily-reviews".to_string()]);

        let instance = &acct.challenges.daily["daily-reviews"];
        assert_eq!(instance.progress, 3);
        assert!(instance.completed);

        // Completed instances stop accruing.
        assert!(record_progress(&mut acct, ActivityKind::Review, 1, now).unwrap().is_empty());
        assert_eq!(acct.challenges.daily["daily-reviews"].progress, 3);
    }

    #[test]
    fn test_progress_ignores_other_activities_and_periods() {
        let (mut acct, now) = seeded();
        record_progress(&mut acct, ActivityKind::Checkin, 1, now).unwrap();
        assert_eq!(acct.challenges.daily["daily-reviews"].progress, 0);

        let later = now + Duration::days(2);
        record_progress(&mut acct, ActivityKind::Review, 3, later).unwrap();
        assert!(!acct.challenges.daily["daily-reviews"].completed);
    }

    #[test]
    fn test_claim_lifecycle() {
        let (mut acct, now) = seeded();
        let early = claim(&mut acct, "daily-reviews", ChallengePeriod::Daily, now);
        assert!(matches!(early, Err(LoyaltyError::InvalidState(_))));

        record_progress(&mut acct, ActivityKind::Review, 3, now).unwrap();
        assert_eq!(claim(&mut acct, "daily-reviews", ChallengePeriod::Daily, now).unwrap(), 75);
        assert_eq!(acct.points.current, 75);

        let again = claim(&mut acct, "daily-reviews", ChallengePeriod::Daily, now);
        assert!(matches!(again, Err(LoyaltyError::AlreadyClaimed(_))));
        assert_eq!(acct.points.current, 75);

        let missing = claim(&mut acct, "daily-reviews", ChallengePeriod::Weekly, now);
        assert!(matches!(missing, Err(LoyaltyError::NotFound(_))));
    }
}
