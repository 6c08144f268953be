//! Loyalty program catalog: tiers, reward definitions, point formulas,
//! challenge templates and partner restaurant overrides.
//!
//! A `Program` is read-mostly and shared by every account. Operations receive
//! an explicit snapshot; choosing which record is active is done once through
//! [`select_active`].

use crate::account::ActivityKind;
use crate::error::{LoyaltyError, LoyaltyResult};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─── Program ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
    pub points_config: PointsConfig,
    pub tiers: Vec<TierDefinition>,
    /// Catalog keyed by reward id.
    #[serde(default)]
    pub rewards: BTreeMap<String, RewardDefinition>,
    #[serde(default)]
    pub gamification: GamificationConfig,
    /// Overrides keyed by restaurant id.
    #[serde(default)]
    pub partner_restaurants: BTreeMap<String, PartnerOverride>,
    #[serde(default)]
    pub settings: ProgramSettings,
}

/// Point formulas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsConfig {
    pub base_points_per_booking: u64,
    pub points_per_dollar: f64,
    /// Zero disables the cap.
    pub max_points_per_booking: u64,
    pub review_points: u64,
    pub referral_points: u64,
    pub social_share_points: u64,
    pub checkin_points: u64,
    /// Zero means earned points never expire.
    pub expiration_days: u32,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            base_points_per_booking: 50,
            points_per_dollar: 1.0,
            max_points_per_booking: 500,
            review_points: 25,
            referral_points: 200,
            social_share_points: 10,
            checkin_points: 15,
            expiration_days: 365,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierDefinition {
    pub name: String,
    pub level: u32,
    pub min_points: u64,
    pub max_points: u64,
    #[serde(default)]
    pub benefits: Vec<String>,
}

/// Reward payload, keyed by reward type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardValue {
    Discount { percentage: f64 },
    FreeItem { item_ref: String },
    Cashback { amount: f64 },
    GiftCard { amount: f64 },
    Experience { descriptor: String },
    Merchandise { sku_ref: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub points_cost: u64,
    pub value: RewardValue,
    pub is_active: bool,
    /// `None` means unlimited.
    #[serde(default)]
    pub max_redemptions: Option<u64>,
    #[serde(default)]
    pub current_redemptions: u64,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl RewardDefinition {
    /// Active, inside its validity window, and under its redemption cap.
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return false;
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return false;
        }
        self.has_capacity()
    }

    pub fn has_capacity(&self) -> bool {
        self.max_redemptions
            .map_or(true, |max| self.current_redemptions < max)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GamificationConfig {
    #[serde(default)]
    pub daily_challenges: Vec<ChallengeTemplate>,
    #[serde(default)]
    pub weekly_challenges: Vec<ChallengeTemplate>,
    #[serde(default)]
    pub streaks: StreakConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeTemplate {
    pub id: String,
    pub name: String,
    pub activity: ActivityKind,
    pub target: u32,
    pub points_reward: u64,
}

/// Streak milestone parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakConfig {
    /// A bonus is granted each time a streak reaches a multiple of this. Zero disables it.
    pub milestone_interval: u32,
    pub milestone_bonus: u64,
    /// Days without activity after which the scheduler should reset a streak.
    pub grace_days: u32,
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            milestone_interval: 5,
            milestone_bonus: 50,
            grace_days: 7,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnerOverride {
    pub restaurant_id: String,
    #[serde(default)]
    pub booking_points: Option<u64>,
    #[serde(default)]
    pub review_points: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSettings {
    /// Minimum balance a user must hold before any redemption.
    pub min_redemption_points: u64,
    /// Points per currency unit.
    pub conversion_rate: f64,
    pub welcome_bonus: u64,
    pub birthday_bonus: u64,
    pub anniversary_bonus: u64,
}

impl Default for ProgramSettings {
    fn default() -> Self {
        Self {
            min_redemption_points: 0,
            conversion_rate: 100.0,
            welcome_bonus: 0,
            birthday_bonus: 100,
            anniversary_bonus: 200,
        }
    }
}

impl Program {
    /// Highest tier whose `min_points` is reached; ties go to the higher level.
    pub fn tier_by_points(&self, points: u64) -> Option<&TierDefinition> {
        self.tiers
            .iter()
            .filter(|t| t.min_points <= points)
            .max_by_key(|t| (t.min_points, t.level))
    }

    /// Lowest tier strictly above `points`.
    pub fn next_tier(&self, points: u64) -> Option<&TierDefinition> {
        self.tiers
            .iter()
            .filter(|t| t.min_points > points)
            .min_by_key(|t| (t.min_points, t.level))
    }

    /// Entry tier for new members.
    pub fn base_tier(&self) -> Option<&TierDefinition> {
        self.tiers.iter().min_by_key(|t| (t.min_points, t.level))
    }

    /// Percentage toward the next tier, clamped to `[0, 100]`. 100 at the top
    /// tier and 0 below it, since `points` is under `next.min_points` there.
    pub fn next_tier_progress(&self, points: u64) -> f64 {
        let Some(next) = self.next_tier(points) else {
            return 100.0;
        };
        let span = next.max_points.saturating_sub(next.min_points);
        if span == 0 {
            return 0.0;
        }
        let raw = (points as f64 - next.min_points as f64) / span as f64 * 100.0;
        raw.clamp(0.0, 100.0)
    }

    /// `base + floor(amount * per_dollar)`, replaced wholesale by a partner
    /// override when present, then capped.
    pub fn booking_points(&self, amount_paid: f64, restaurant_id: Option<&str>) -> u64 {
        let cfg = &self.points_config;
        let partner = restaurant_id
            .and_then(|id| self.partner_restaurants.get(id))
            .and_then(|p| p.booking_points);

        let points = match partner {
            Some(custom) => custom,
            None => {
                let variable = (amount_paid.max(0.0) * cfg.points_per_dollar).floor() as u64;
                cfg.base_points_per_booking.saturating_add(variable)
            }
        };

        if cfg.max_points_per_booking > 0 {
            points.min(cfg.max_points_per_booking)
        } else {
            points
        }
    }

    pub fn review_points(&self, restaurant_id: Option<&str>) -> u64 {
        restaurant_id
            .and_then(|id| self.partner_restaurants.get(id))
            .and_then(|p| p.review_points)
            .unwrap_or(self.points_config.review_points)
    }

    /// Expiry stamp for points earned at `now`, if the program expires points.
    pub fn expiry_for(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.points_config.expiration_days {
            0 => None,
            days => Some(now + Duration::days(i64::from(days))),
        }
    }

    /// Rewards that can be redeemed at `now`, in catalog order.
    pub fn available_rewards(&self, now: DateTime<Utc>) -> Vec<&RewardDefinition> {
        self.rewards
            .values()
            .filter(|r| r.is_available_at(now))
            .collect()
    }

    pub fn is_available(&self, reward_id: &str, now: DateTime<Utc>) -> bool {
        self.rewards
            .get(reward_id)
            .is_some_and(|r| r.is_available_at(now))
    }

    /// Currency equivalent of a point amount.
    pub fn cash_value(&self, points: u64) -> f64 {
        if self.settings.conversion_rate <= 0.0 {
            return 0.0;
        }
        points as f64 / self.settings.conversion_rate
    }

    pub fn templates(&self, activity: ActivityKind) -> impl Iterator<Item = &ChallengeTemplate> {
        self.gamification
            .daily_challenges
            .iter()
            .chain(self.gamification.weekly_challenges.iter())
            .filter(move |t| t.activity == activity)
    }

    /// Structural checks run when a program is loaded.
    pub fn validate(&self) -> LoyaltyResult<()> {
        if self.id.is_empty() {
            return Err(LoyaltyError::validation("program id must not be empty"));
        }
        if self.tiers.is_empty() {
            return Err(LoyaltyError::validation(format!(
                "program {} defines no tiers",
                self.id
            )));
        }
        for tier in &self.tiers {
            if tier.max_points < tier.min_points {
                return Err(LoyaltyError::validation(format!(
                    "tier {} has max_points below min_points",
                    tier.name
                )));
            }
        }
        for (key, reward) in &self.rewards {
            if key != &reward.id {
                return Err(LoyaltyError::validation(format!(
                    "reward keyed {key} carries id {}",
                    reward.id
                )));
            }
            if reward.points_cost == 0 {
                return Err(LoyaltyError::validation(format!(
                    "reward {} must cost at least one point",
                    reward.id
                )));
            }
        }
        for template in self
            .gamification
            .daily_challenges
            .iter()
            .chain(&self.gamification.weekly_challenges)
        {
            if template.target == 0 {
                return Err(LoyaltyError::validation(format!(
                    "challenge {} has a zero target",
                    template.id
                )));
            }
        }
        Ok(())
    }

    /// Development catalog used when no program file is configured.
    pub fn demo() -> Self {
        let tier = |name: &str, level, min_points, max_points, benefits: &[&str]| TierDefinition {
            name: name.to_string(),
            level,
            min_points,
            max_points,
            benefits: benefits.iter().map(|b| b.to_string()).collect(),
        };
        let reward = |id: &str, name: &str, points_cost, value| RewardDefinition {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            points_cost,
            value,
            is_active: true,
            max_redemptions: None,
            current_redemptions: 0,
            valid_from: None,
            valid_until: None,
        };
        let template = |id: &str, name: &str, activity, target, points_reward| ChallengeTemplate {
            id: id.to_string(),
            name: name.to_string(),
            activity,
            target,
            points_reward,
        };

        let rewards = [
            reward(
                "discount-10",
                "10% off your next booking",
                500,
                RewardValue::Discount { percentage: 10.0 },
            ),
            reward(
                "free-dessert",
                "Free dessert",
                800,
                RewardValue::FreeItem {
                    item_ref: "dessert".to_string(),
                },
            ),
            reward(
                "gift-card-25",
                "$25 gift card",
                2500,
                RewardValue::GiftCard { amount: 25.0 },
            ),
        ]
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();

        Self {
            id: "default".to_string(),
            name: "Dining Rewards".to_string(),
            is_active: true,
            updated_at: Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now),
            points_config: PointsConfig::default(),
            tiers: vec![
                tier("Bronze", 1, 0, 999, &["member_pricing"]),
                tier("Silver", 2, 1000, 4999, &["priority_waitlist"]),
                tier("Gold", 3, 5000, 14999, &["priority_waitlist", "free_delivery"]),
                tier("Platinum", 4, 15000, u64::MAX, &["concierge", "chef_table"]),
            ],
            rewards,
            gamification: GamificationConfig {
                daily_challenges: vec![template(
                    "daily-review",
                    "Leave a review today",
                    ActivityKind::Review,
                    1,
                    20,
                )],
                weekly_challenges: vec![template(
                    "weekly-bookings",
                    "Book three meals this week",
                    ActivityKind::Booking,
                    3,
                    150,
                )],
                streaks: StreakConfig::default(),
            },
            partner_restaurants: BTreeMap::new(),
            settings: ProgramSettings::default(),
        }
    }
}

/// Pick the active program deterministically: among records flagged active,
/// the most recently updated wins and ties go to the smallest id.
pub fn select_active(programs: &[Program]) -> LoyaltyResult<&Program> {
    programs
        .iter()
        .filter(|p| p.is_active)
        .min_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)))
        .ok_or_else(|| LoyaltyError::not_found("active program"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_by_points_picks_highest_reached() {
        let program = Program::demo();
        assert_eq!(program.tier_by_points(0).unwrap().name, "Bronze");
        assert_eq!(program.tier_by_points(999).unwrap().name, "Bronze");
        assert_eq!(program.tier_by_points(1000).unwrap().name, "Silver");
        assert_eq!(program.tier_by_points(20_000).unwrap().name, "Platinum");
    }

    #[test]
    fn test_tier_ties_break_on_level() {
        let mut program = Program::demo();
        program.tiers.push(TierDefinition {
            name: "Silver Plus".into(),
            level: 9,
            min_points: 1000,
            max_points: 4999,
            benefits: vec![],
        });
        assert_eq!(program.tier_by_points(1500).unwrap().name, "Silver Plus");
    }

    #[test]
    fn test_next_tier() {
        let program = Program::demo();
        assert_eq!(program.next_tier(0).unwrap().name, "Silver");
        assert_eq!(program.next_tier(1000).unwrap().name, "Gold");
        assert!(program.next_tier(15_000).is_none());
    }

    #[test]
    fn test_next_tier_progress_is_clamped() {
        let program = Program::demo();
        let progress = program.next_tier_progress(10);
        assert!((0.0..=100.0).contains(&progress));
        assert_eq!(progress, 0.0);
        for points in [0, 999, 1_000, 4_999, 5_000, 14_999] {
            assert_eq!(program.next_tier_progress(points), 0.0, "points {points}");
        }
        assert_eq!(program.next_tier_progress(15_000), 100.0);
        assert_eq!(program.next_tier_progress(50_000), 100.0);
    }

    #[test]
    fn test_booking_points_formula_and_cap() {
        let program = Program::demo();
        // 50 base + floor(42.9 * 1.0)
        assert_eq!(program.booking_points(42.9, None), 92);
        // capped at 500
        assert_eq!(program.booking_points(10_000.0, None), 500);
    }

    #[test]
    fn test_booking_points_huge_amount_saturates_to_cap() {
        let mut program = Program::demo();
        assert_eq!(program.booking_points(1e30, None), 500);
        assert_eq!(program.booking_points(f64::MAX, None), 500);

        program.points_config.max_points_per_booking = 0;
        assert_eq!(program.booking_points(1e30, None), u64::MAX);
    }

    #[test]
    fn test_partner_override_replaces_formula() {
        let mut program = Program::demo();
        program.partner_restaurants.insert(
            "r-1".into(),
            PartnerOverride {
                restaurant_id: "r-1".into(),
                booking_points: Some(300),
                review_points: Some(60),
            },
        );
        assert_eq!(program.booking_points(1.0, Some("r-1")), 300);
        assert_eq!(program.review_points(Some("r-1")), 60);
        assert_eq!(program.review_points(Some("r-2")), 25);

        program.partner_restaurants.get_mut("r-1").unwrap().booking_points = Some(9_000);
        assert_eq!(program.booking_points(1.0, Some("r-1")), 500);
    }

    #[test]
    fn test_available_rewards_respects_window_and_cap() {
        let mut program = Program::demo();
        let now = Utc::now();
        {
            let dessert = program.rewards.get_mut("free-dessert").unwrap();
            dessert.max_redemptions = Some(1);
            dessert.current_redemptions = 1;
        }
        program.rewards.get_mut("gift-card-25").unwrap().valid_until =
            Some(now - Duration::days(1));

        let first: Vec<_> = program.available_rewards(now).iter().map(|r| r.id.clone()).collect();
        let second: Vec<_> = program.available_rewards(now).iter().map(|r| r.id.clone()).collect();
        assert_eq!(first, vec!["discount-10".to_string()]);
        assert_eq!(first, second);
        assert!(!program.is_available("free-dessert", now));
        assert!(!program.is_available("missing", now));
    }

    #[test]
    fn test_reward_value_is_tagged() {
        let json = serde_json::to_value(RewardValue::Cashback { amount: 5.0 }).unwrap();
        assert_eq!(json["type"], "cashback");
        assert_eq!(json["amount"], 5.0);
    }

    #[test]
    fn test_select_active_is_deterministic() {
        let mut a = Program::demo();
        a.id = "b".into();
        let mut b = Program::demo();
        b.id = "a".into();
        let mut c = Program::demo();
        c.id = "c".into();
        c.is_active = false;
        c.updated_at = Utc::now();

        let programs = vec![a.clone(), b.clone(), c.clone()];
        assert_eq!(select_active(&programs).unwrap().id, "a");

        a.updated_at = Utc::now();
        let programs = vec![a, b, c];
        assert_eq!(select_active(&programs).unwrap().id, "b");

        assert!(select_active(&[]).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_tiers() {
        let mut program = Program::demo();
        assert!(program.validate().is_ok());
        program.tiers.clear();
        assert!(matches!(program.validate(), Err(LoyaltyError::Validation(_))));
    }
}
