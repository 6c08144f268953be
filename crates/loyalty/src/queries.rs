//! Read-side views over accounts and the active program.

use crate::engine::LoyaltyEngine;
use chrono::Utc;
use dinepoints_core::account::{Account, ChallengeInstance, ChallengePeriod, PointsEntry};
use dinepoints_core::error::{LoyaltyError, LoyaltyResult};
use dinepoints_core::program::RewardDefinition;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub user_id: String,
    pub page: usize,
    pub limit: usize,
    pub total_entries: usize,
    pub entries: Vec<PointsEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveChallenges {
    pub daily: Vec<ChallengeInstance>,
    pub weekly: Vec<ChallengeInstance>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardMetric {
    #[default]
    Points,
    Streak,
    Activity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub tier: String,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardView {
    #[serde(flatten)]
    pub reward: RewardDefinition,
    /// Monetary equivalent of the points cost.
    pub cash_value: f64,
}

impl LeaderboardMetric {
    fn score(self, account: &Account) -> u64 {
        match self {
            Self::Points => account.points.total,
            Self::Streak => u64::from(account.streaks.best_current()),
            Self::Activity => account.activity.total(),
        }
    }
}

impl LoyaltyEngine {
    pub fn get_account(&self, user_id: &str) -> LoyaltyResult<Account> {
        self.load(user_id)
    }

    /// One page of ledger entries, newest first. `page` starts at 1; a zero
    /// `limit` means the configured default and larger limits are capped.
    pub fn points_history(&self, user_id: &str, page: usize, limit: usize) -> LoyaltyResult<HistoryPage> {
        if page == 0 {
            return Err(LoyaltyError::validation("page starts at 1"));
        }
        let limit = match limit {
            0 => self.config.default_history_limit,
            n => n.min(self.config.max_history_limit),
        };
        let account = self.load(user_id)?;
        Ok(HistoryPage {
            user_id: account.user_id.clone(),
            page,
            limit,
            total_entries: account.points_history.len(),
            entries: account.history_page(page, limit),
        })
    }

    /// Challenge instances for the current day and week.
    pub fn active_challenges(&self, user_id: &str) -> LoyaltyResult<ActiveChallenges> {
        let account = self.load(user_id)?;
        let now = Utc::now();
        Ok(ActiveChallenges {
            daily: account.challenges.current(ChallengePeriod::Daily, now).into_iter().cloned().collect(),
            weekly: account.challenges.current(ChallengePeriod::Weekly, now).into_iter().cloned().collect(),
        })
    }

    /// Top active accounts by `metric`, ties broken by user id.
    pub fn leaderboard(&self, metric: LeaderboardMetric, limit: usize) -> LoyaltyResult<Vec<LeaderboardEntry>> {
        let mut scored: Vec<(u64, Account)> = self
            .accounts
            .list()?
            .into_iter()
            .filter(Account::is_active)
            .map(|a| (metric.score(&a), a))
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.user_id.cmp(&b.user_id)));

        Ok(scored
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (value, account))| LeaderboardEntry {
                rank: i + 1,
                user_id: account.user_id,
                tier: account.tier.current,
                value,
            })
            .collect())
    }

    /// Rewards redeemable right now, with their cash equivalent.
    pub fn available_rewards(&self) -> LoyaltyResult<Vec<RewardView>> {
        let program = self.program()?;
        let now = Utc::now();
        Ok(program
            .available_rewards(now)
            .into_iter()
            .map(|r| RewardView {
                cash_value: program.cash_value(r.points_cost),
                reward: r.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::EnrollRequest;
    use dinepoints_core::account::{AccountStatus, PointsSource};
    use dinepoints_core::config::EngineConfig;
    use dinepoints_core::events::noop_notifier;
    use dinepoints_core::program::Program;

    fn engine_with(users: &[(&str, i64)]) -> LoyaltyEngine {
        let engine =
            LoyaltyEngine::in_memory(&EngineConfig::default(), Program::demo(), noop_notifier()).unwrap();
        for (user, points) in users {
            engine
                .enroll(&EnrollRequest {
                    user_id: user.to_string(),
                    premium: false,
                    birthday: None,
                })
                .unwrap();
            if *points > 0 {
                engine
                    .add_points(user, *points, PointsSource::Booking, "seed", None, None)
                    .unwrap();
            }
        }
        engine
    }

    #[test]
    fn test_history_paging() {
        let engine = engine_with(&[("u1", 0)]);
        for i in 1..=5 {
            engine
                .add_points("u1", i, PointsSource::Review, "r", None, None)
                .unwrap();
        }
        let first = engine.points_history("u1", 1, 2).unwrap();
        assert_eq!(first.total_entries, 5);
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.entries[0].amount, 5);

        let last = engine.points_history("u1", 3, 2).unwrap();
        assert_eq!(last.entries.len(), 1);
        assert_eq!(last.entries[0].amount, 1);

        assert!(engine.points_history("u1", 9, 2).unwrap().entries.is_empty());
        let far = engine.points_history("u1", usize::MAX / 2, 100).unwrap();
        assert!(far.entries.is_empty());
        assert_eq!(far.total_entries, 5);
        assert!(matches!(engine.points_history("u1", 0, 2), Err(LoyaltyError::Validation(_))));
        assert_eq!(engine.points_history("u1", 1, 0).unwrap().limit, 20);
        assert_eq!(engine.points_history("u1", 1, 10_000).unwrap().limit, 100);
    }

    #[test]
    fn test_leaderboard_orders_and_filters() {
        let engine = engine_with(&[("carol", 300), ("alice", 300), ("bob", 700), ("dave", 900)]);
        engine.set_status("dave", AccountStatus::Suspended).unwrap();

        let board = engine.leaderboard(LeaderboardMetric::Points, 10).unwrap();
        let order: Vec<_> = board.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["bob", "alice", "carol"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].value, 700);

        assert_eq!(engine.leaderboard(LeaderboardMetric::Points, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_available_rewards_carry_cash_value() {
        let engine = engine_with(&[]);
        let rewards = engine.available_rewards().unwrap();
        assert_eq!(rewards.len(), 3);
        let gift = rewards.iter().find(|r| r.reward.id == "gift-card-25").unwrap();
        assert!((gift.cash_value - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_active_challenges_after_assign() {
        let engine = engine_with(&[("u1", 0)]);
        assert!(engine.active_challenges("u1").unwrap().daily.is_empty());
        engine.assign_challenges("u1").unwrap();
        let active = engine.active_challenges("u1").unwrap();
        assert_eq!(active.daily.len(), 1);
        assert_eq!(active.weekly.len(), 1);
    }
}
