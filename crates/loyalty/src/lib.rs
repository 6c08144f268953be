#![warn(clippy::unwrap_used)]

pub mod challenge;
pub mod engine;
pub mod ledger;
pub mod queries;
pub mod redemption;
pub mod store;
pub mod streak;
pub mod tier;

pub use engine::{AwardReceipt, ClaimReceipt, EnrollRequest, LoyaltyEngine, Occasion};
pub use queries::{ActiveChallenges, HistoryPage, LeaderboardEntry, LeaderboardMetric, RewardView};
pub use redemption::{RedeemReceipt, RedeemRequest};
pub use store::{AccountStore, CodeRegistry, InMemoryAccountStore, ProgramStore};
pub use streak::StreakUpdate;
pub use tier::TierChange;
