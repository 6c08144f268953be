//! Loyalty account aggregate, one per user.
//!
//! Holds the balance, the append-only points ledger, tier state, streaks,
//! challenge instances and redeemed rewards. Every write goes through the
//! account store with a `version` check, so an `Account` value is always a
//! snapshot of one committed state.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ─── Enums ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    Suspended,
    Inactive,
}

/// Qualifying customer activities that earn points and drive challenges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Booking,
    Review,
    Checkin,
    Referral,
}

/// Activities that carry a streak.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StreakKind {
    Booking,
    Review,
}

impl StreakKind {
    pub const ALL: [StreakKind; 2] = [StreakKind::Booking, StreakKind::Review];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Earned,
    Spent,
    Expired,
    Bonus,
    Adjustment,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PointsSource {
    Booking,
    Review,
    Checkin,
    Referral,
    Challenge,
    Streak,
    Bonus,
    Redemption,
    Adjustment,
    TierUpgrade,
}

impl PointsSource {
    /// Entry type recorded for a credit from this source.
    pub fn credit_type(&self) -> EntryType {
        match self {
            PointsSource::Booking
            | PointsSource::Review
            | PointsSource::Checkin
            | PointsSource::Referral
            | PointsSource::Challenge => EntryType::Earned,
            PointsSource::Streak | PointsSource::Bonus | PointsSource::TierUpgrade => {
                EntryType::Bonus
            }
            PointsSource::Redemption | PointsSource::Adjustment => EntryType::Adjustment,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePeriod {
    Daily,
    Weekly,
}

impl ChallengePeriod {
    /// First day of the period containing `now`. Weeks start on Sunday.
    pub fn start_for(&self, now: DateTime<Utc>) -> NaiveDate {
        let today = now.date_naive();
        match self {
            ChallengePeriod::Daily => today,
            ChallengePeriod::Weekly => {
                let back = i64::from(today.weekday().num_days_from_sunday());
                today - chrono::Duration::days(back)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    Active,
    Used,
    Expired,
}

// ─── Ledger ─────────────────────────────────────────────────────────────────

/// Immutable ledger line. Signed `amount`: credits positive, debits negative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointsEntry {
    pub id: Uuid,
    pub entry_type: EntryType,
    pub amount: i64,
    pub description: String,
    pub source: PointsSource,
    pub source_id: Option<String>,
    pub date: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointsBalance {
    pub current: u64,
    /// Lifetime credits; never decreases.
    pub total: u64,
    pub expired: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierState {
    pub current: String,
    pub level: u32,
    pub points_in_tier: u64,
    pub tier_start_date: DateTime<Utc>,
    pub next_tier_progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub join_date: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_premium: bool,
    pub premium_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityCounters {
    pub total_bookings: u64,
    pub total_reviews: u64,
    pub total_checkins: u64,
    pub total_referrals: u64,
    pub last_booking: Option<DateTime<Utc>>,
    pub last_review: Option<DateTime<Utc>>,
    pub last_checkin: Option<DateTime<Utc>>,
    pub last_referral: Option<DateTime<Utc>>,
}

impl ActivityCounters {
    pub fn record(&mut self, kind: ActivityKind, at: DateTime<Utc>) {
        let (counter, last) = match kind {
            ActivityKind::Booking => (&mut self.total_bookings, &mut self.last_booking),
            ActivityKind::Review => (&mut self.total_reviews, &mut self.last_review),
            ActivityKind::Checkin => (&mut self.total_checkins, &mut self.last_checkin),
            ActivityKind::Referral => (&mut self.total_referrals, &mut self.last_referral),
        };
        *counter += 1;
        *last = Some(at);
    }

    pub fn total(&self) -> u64 {
        self.total_bookings + self.total_reviews + self.total_checkins + self.total_referrals
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Streak {
    pub current: u32,
    pub longest: u32,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Streaks {
    pub booking: Streak,
    pub review: Streak,
}

impl Streaks {
    pub fn get(&self, kind: StreakKind) -> &Streak {
        match kind {
            StreakKind::Booking => &self.booking,
            StreakKind::Review => &self.review,
        }
    }

    pub fn get_mut(&mut self, kind: StreakKind) -> &mut Streak {
        match kind {
            StreakKind::Booking => &mut self.booking,
            StreakKind::Review => &mut self.review,
        }
    }

    pub fn best_current(&self) -> u32 {
        self.booking.current.max(self.review.current)
    }
}

// ─── Rewards & Challenges ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedeemedReward {
    pub reward_id: String,
    pub name: String,
    pub points_cost: u64,
    pub redeemed_at: DateTime<Utc>,
    pub status: RedemptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    /// Unique across the whole system.
    pub code: String,
}

impl RedeemedReward {
    /// Status as seen at `now`: an active code past its expiry reads as expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> RedemptionStatus {
        match (self.status, self.expires_at) {
            (RedemptionStatus::Active, Some(exp)) if now > exp => RedemptionStatus::Expired,
            (status, _) => status,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountRewards {
    /// Keyed by redemption code.
    pub redeemed: BTreeMap<String, RedeemedReward>,
    /// Reward ids the member can currently afford.
    pub available: Vec<String>,
    /// Client idempotency key to redemption code.
    #[serde(default)]
    pub idempotency_keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChallengeInstance {
    pub challenge_id: String,
    pub name: String,
    pub activity: ActivityKind,
    pub period: ChallengePeriod,
    /// The day for daily instances, the Sunday for weekly ones.
    pub period_start: NaiveDate,
    pub target: u32,
    pub progress: u32,
    pub completed: bool,
    pub points_reward: u64,
    pub claimed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeBoard {
    /// Keyed by challenge id; one instance per template for its latest period.
    pub daily: BTreeMap<String, ChallengeInstance>,
    pub weekly: BTreeMap<String, ChallengeInstance>,
}

impl ChallengeBoard {
    pub fn slot(&self, period: ChallengePeriod) -> &BTreeMap<String, ChallengeInstance> {
        match period {
            ChallengePeriod::Daily => &self.daily,
            ChallengePeriod::Weekly => &self.weekly,
        }
    }

    pub fn slot_mut(&mut self, period: ChallengePeriod) -> &mut BTreeMap<String, ChallengeInstance> {
        match period {
            ChallengePeriod::Daily => &mut self.daily,
            ChallengePeriod::Weekly => &mut self.weekly,
        }
    }

    /// Instances belonging to the period containing `now`.
    pub fn current(&self, period: ChallengePeriod, now: DateTime<Utc>) -> Vec<&ChallengeInstance> {
        let start = period.start_for(now);
        self.slot(period)
            .values()
            .filter(|c| c.period_start == start)
            .collect()
    }
}

// ─── Account ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    /// Optimistic concurrency token; bumped by every committed write.
    pub version: u64,
    pub points: PointsBalance,
    pub tier: TierState,
    pub status: AccountStatus,
    pub membership: Membership,
    pub activity: ActivityCounters,
    pub streaks: Streaks,
    pub rewards: AccountRewards,
    pub challenges: ChallengeBoard,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,
    pub points_history: Vec<PointsEntry>,
}

impl Account {
    /// Fresh account placed in `tier` (normally the program's entry tier).
    pub fn new(user_id: impl Into<String>, tier: &str, level: u32, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            version: 0,
            points: PointsBalance::default(),
            tier: TierState {
                current: tier.to_string(),
                level,
                points_in_tier: 0,
                tier_start_date: now,
                next_tier_progress: 0.0,
            },
            status: AccountStatus::Active,
            membership: Membership {
                join_date: now,
                last_activity: now,
                is_premium: false,
                premium_since: None,
                birthday: None,
            },
            activity: ActivityCounters::default(),
            streaks: Streaks::default(),
            rewards: AccountRewards::default(),
            challenges: ChallengeBoard::default(),
            achievements: Vec::new(),
            preferences: BTreeMap::new(),
            points_history: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Whether a credit from `(source, source_id)` is already on the ledger.
    pub fn has_award(&self, source: PointsSource, source_id: &str) -> bool {
        self.points_history
            .iter()
            .any(|e| e.source == source && e.source_id.as_deref() == Some(source_id))
    }

    /// Whether a check-in was already awarded for `date`. Check-in credits
    /// carry the calendar day as their source id.
    pub fn has_checkin_on(&self, date: NaiveDate) -> bool {
        self.has_award(PointsSource::Checkin, &date.to_string())
    }

    /// Sum of signed ledger amounts. Equals `points.current` for a consistent account.
    pub fn ledger_sum(&self) -> i64 {
        self.points_history.iter().map(|e| e.amount).sum()
    }

    /// History newest first, `page` starting at 1.
    pub fn history_page(&self, page: usize, limit: usize) -> Vec<PointsEntry> {
        // Entries are appended in commit order.
        self.points_history
            .iter()
            .rev()
            .skip(page.saturating_sub(1).saturating_mul(limit))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(source: PointsSource, source_id: Option<&str>, amount: i64, date: DateTime<Utc>) -> PointsEntry {
        PointsEntry {
            id: Uuid::new_v4(),
            entry_type: source.credit_type(),
            amount,
            description: "test".into(),
            source,
            source_id: source_id.map(str::to_string),
            date,
            expires_at: None,
        }
    }

    #[test]
    fn test_week_starts_on_sunday() {
        // 2026-10-21 is a Wednesday
        let wed = Utc.with_ymd_and_hms(2026, 10, 21, 12, 0, 0).unwrap();
        let start = ChallengePeriod::Weekly.start_for(wed);
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        assert_eq!(start.weekday(), chrono::Weekday::Sun);

        let sunday = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        assert_eq!(ChallengePeriod::Weekly.start_for(sunday), sunday.date_naive());
        assert_eq!(ChallengePeriod::Daily.start_for(wed), wed.date_naive());
    }

    #[test]
    fn test_duplicate_lookup_helpers() {
        let now = Utc::now();
        let mut account = Account::new("u1", "Bronze", 1, now);
        account
            .points_history
            .push(entry(PointsSource::Referral, Some("friend-1"), 200, now));
        account
            .points_history
            .push(entry(PointsSource::Checkin, Some(&now.date_naive().to_string()), 15, now));

        assert!(account.has_award(PointsSource::Referral, "friend-1"));
        assert!(!account.has_award(PointsSource::Referral, "friend-2"));
        assert!(!account.has_award(PointsSource::Booking, "friend-1"));
        assert!(account.has_checkin_on(now.date_naive()));
        assert!(!account.has_checkin_on(now.date_naive().pred_opt().unwrap()));
        assert_eq!(account.ledger_sum(), 215);
    }

    #[test]
    fn test_history_page_newest_first() {
        let base = Utc::now();
        let mut account = Account::new("u1", "Bronze", 1, base);
        for i in 0..5 {
            account.points_history.push(entry(
                PointsSource::Booking,
                Some(&format!("b-{i}")),
                10 + i,
                base + chrono::Duration::minutes(i),
            ));
        }
        let first = account.history_page(1, 2);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].amount, 14);
        assert_eq!(first[1].amount, 13);
        let last = account.history_page(3, 2);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].amount, 10);
        assert!(account.history_page(4, 2).is_empty());
        assert!(account.history_page(usize::MAX / 2, 100).is_empty());
        assert!(account.history_page(usize::MAX, usize::MAX).is_empty());
    }

    #[test]
    fn test_redeemed_reward_expiry_on_read() {
        let now = Utc::now();
        let reward = RedeemedReward {
            reward_id: "r".into(),
            name: "Free dessert".into(),
            points_cost: 800,
            redeemed_at: now,
            status: RedemptionStatus::Active,
            expires_at: Some(now - chrono::Duration::hours(1)),
            code: "ABCD1234".into(),
        };
        assert_eq!(reward.effective_status(now), RedemptionStatus::Expired);
        let used = RedeemedReward {
            status: RedemptionStatus::Used,
            ..reward
        };
        assert_eq!(used.effective_status(now), RedemptionStatus::Used);
    }

    #[test]
    fn test_credit_types() {
        assert_eq!(PointsSource::Booking.credit_type(), EntryType::Earned);
        assert_eq!(PointsSource::TierUpgrade.credit_type(), EntryType::Bonus);
        assert_eq!(PointsSource::Adjustment.credit_type(), EntryType::Adjustment);
    }
}
