//! Consecutive-activity streaks. Awards never decay a streak on their own:
//! a scheduler calls `LoyaltyEngine::reset_lapsed_streaks`, which resets every
//! streak [`is_lapsed`] reports with `increment = false`.

use crate::ledger::{self, Credit};
use chrono::{DateTime, Duration, Utc};
use dinepoints_core::account::{Account, PointsSource, Streak, StreakKind};
use dinepoints_core::error::LoyaltyResult;
use dinepoints_core::program::StreakConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakUpdate {
    pub kind: StreakKind,
    pub streak: Streak,
    /// Milestone bonus credited by this update.
    pub bonus: u64,
}

pub fn update(
    account: &mut Account,
    kind: StreakKind,
    increment: bool,
    config: &StreakConfig,
    now: DateTime<Utc>,
) -> LoyaltyResult<StreakUpdate> {
    let streak = account.streaks.get_mut(kind);
    if increment {
        streak.current += 1;
        streak.last_activity = Some(now);
        streak.longest = streak.longest.max(streak.current);
    } else {
        streak.current = 0;
    }
    let snapshot = streak.clone();

    let mut bonus = 0;
    if increment
        && config.milestone_interval > 0
        && config.milestone_bonus > 0
        && snapshot.current % config.milestone_interval == 0
    {
        ledger::credit(
            account,
            Credit::new(
                config.milestone_bonus,
                PointsSource::Streak,
                format!("{}-day {:?} streak", snapshot.current, kind).to_lowercase(),
            ),
            now,
        )?;
        bonus = config.milestone_bonus;
    }

    debug!(
        user_id = %account.user_id,
        kind = ?kind,
        current = snapshot.current,
        longest = snapshot.longest,
        bonus,
        "Streak updated"
    );

    Ok(StreakUpdate {
        kind,
        streak: snapshot,
        bonus,
    })
}

/// Whether a streak has gone `grace_days` without activity at `now`.
pub fn is_lapsed(streak: &Streak, grace_days: u32, now: DateTime<Utc>) -> bool {
    match streak.last_activity {
        Some(last) if streak.current > 0 => now - last > Duration::days(i64::from(grace_days)),
        _ => false,
    }
}
