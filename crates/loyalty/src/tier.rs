//! Tier evaluation: maps cumulative points to a program tier.
//!
//! Tiers only move up. An upgrade resets the tier start date and grants one
//! flat `tier_upgrade` bonus; the bonus itself is not re-evaluated, so a single
//! award can never cascade through several upgrades.

use crate::ledger::{self, Credit};
use chrono::{DateTime, Utc};
use dinepoints_core::account::{Account, PointsSource};
use dinepoints_core::error::LoyaltyResult;
use dinepoints_core::program::Program;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierChange {
    pub from: String,
    pub to: String,
    pub level: u32,
    pub bonus: u64,
}

/// Recompute tier state after a balance change. Returns the upgrade, if any.
pub fn evaluate(
    account: &mut Account,
    program: &Program,
    upgrade_bonus: u64,
    now: DateTime<Utc>,
) -> LoyaltyResult<Option<TierChange>> {
    let change = match program.tier_by_points(account.points.total) {
        Some(tier) if tier.level > account.tier.level => {
            let from = std::mem::replace(&mut account.tier.current, tier.name.clone());
            account.tier.level = tier.level;
            account.tier.tier_start_date = now;

            if upgrade_bonus > 0 {
                ledger::credit(
                    account,
                    Credit::new(
                        upgrade_bonus,
                        PointsSource::TierUpgrade,
                        format!("Tier upgrade to {}", tier.name),
                    )
                    .source_id(tier.name.clone()),
                    now,
                )?;
            }

            info!(
                user_id = %account.user_id,
                old = %from,
                new = %tier.name,
                level = tier.level,
                "Tier upgrade"
            );

            Some(TierChange {
                from,
                to: tier.name.clone(),
                level: tier.level,
                bonus: upgrade_bonus,
            })
        }
        _ => None,
    };

    refresh_progress(account, program);
    Ok(change)
}

/// Update `points_in_tier` and `next_tier_progress` without moving tiers.
pub fn refresh_progress(account: &mut Account, program: &Program) {
    let total = account.points.total;
    let floor = program
        .tiers
        .iter()
        .find(|t| t.name == account.tier.current)
        .map_or(0, |t| t.min_points);
    account.tier.points_in_tier = total.saturating_sub(floor);
    account.tier.next_tier_progress = program.next_tier_progress(total);
}
