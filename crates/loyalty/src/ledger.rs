//! Points ledger primitives. Each function mutates a working copy of an
//! account inside an engine transaction; nothing here touches the store.
//!
//! Invariants kept by every primitive:
//! - `points.current` never underflows (debits are checked first);
//! - `points.total` only grows, and only through earned/bonus entries;
//! - every balance change appends exactly one immutable history entry.

use chrono::{DateTime, Utc};
use dinepoints_core::account::{Account, EntryType, PointsEntry, PointsSource};
use dinepoints_core::error::{LoyaltyError, LoyaltyResult};
use std::collections::HashSet;
use uuid::Uuid;

/// A credit to apply to an account.
#[derive(Debug, Clone)]
pub struct Credit {
    pub amount: u64,
    pub source: PointsSource,
    pub description: String,
    pub source_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credit {
    pub fn new(amount: u64, source: PointsSource, description: impl Into<String>) -> Self {
        Self {
            amount,
            source,
            description: description.into(),
            source_id: None,
            expires_at: None,
        }
    }

    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }
}

/// Validate a caller-supplied amount at the operation boundary.
pub fn positive_amount(amount: i64) -> LoyaltyResult<u64> {
    if amount <= 0 {
        return Err(LoyaltyError::validation(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(amount as u64)
}

fn ensure_active(account: &Account) -> LoyaltyResult<()> {
    if !account.is_active() {
        return Err(LoyaltyError::invalid_state(format!(
            "account {} is {:?}",
            account.user_id, account.status
        )));
    }
    Ok(())
}

fn signed(amount: u64) -> LoyaltyResult<i64> {
    i64::try_from(amount)
        .map_err(|_| LoyaltyError::validation(format!("amount {amount} is out of range")))
}

/// Append a credit entry and raise the balance. Returns the new balance.
pub fn credit(account: &mut Account, credit: Credit, now: DateTime<Utc>) -> LoyaltyResult<u64> {
    if credit.amount == 0 {
        return Err(LoyaltyError::validation("credit amount must be positive"));
    }
    ensure_active(account)?;
    let amount = signed(credit.amount)?;

    let entry_type = credit.source.credit_type();
    account.points.current = account
        .points
        .current
        .checked_add(credit.amount)
        .ok_or_else(|| LoyaltyError::validation("balance overflow"))?;
    if matches!(entry_type, EntryType::Earned | EntryType::Bonus) {
        account.points.total = account.points.total.saturating_add(credit.amount);
    }
    account.membership.last_activity = now;

    account.points_history.push(PointsEntry {
        id: Uuid::new_v4(),
        entry_type,
        amount,
        description: credit.description,
        source: credit.source,
        source_id: credit.source_id,
        date: now,
        expires_at: credit.expires_at,
    });

    Ok(account.points.current)
}

/// Append a `spent` entry and lower the balance. Fails without touching the
/// account when the balance does not cover `amount`.
pub fn debit(
    account: &mut Account,
    amount: u64,
    source: PointsSource,
    description: impl Into<String>,
    source_id: Option<String>,
    now: DateTime<Utc>,
) -> LoyaltyResult<u64> {
    if amount == 0 {
        return Err(LoyaltyError::validation("debit amount must be positive"));
    }
    ensure_active(account)?;
    if account.points.current < amount {
        return Err(LoyaltyError::InsufficientPoints {
            required: amount,
            available: account.points.current,
        });
    }
    let signed_amount = signed(amount)?;

    account.points.current -= amount;
    account.membership.last_activity = now;
    account.points_history.push(PointsEntry {
        id: Uuid::new_v4(),
        entry_type: EntryType::Spent,
        amount: -signed_amount,
        description: description.into(),
        source,
        source_id,
        date: now,
        expires_at: None,
    });

    Ok(account.points.current)
}

/// Expire every credit whose `expires_at` has passed and that has no
/// matching `expired` entry yet. Each lapsed credit removes at most its own
/// amount and never more than the remaining balance. Returns points expired.
pub fn expire(account: &mut Account, now: DateTime<Utc>) -> u64 {
    let already: HashSet<String> = account
        .points_history
        .iter()
        .filter(|e| e.entry_type == EntryType::Expired)
        .filter_map(|e| e.source_id.clone())
        .collect();

    let lapsed: Vec<(Uuid, u64)> = account
        .points_history
        .iter()
        .filter(|e| matches!(e.entry_type, EntryType::Earned | EntryType::Bonus))
        .filter(|e| e.expires_at.is_some_and(|exp| exp <= now))
        .filter(|e| !already.contains(&e.id.to_string()))
        .map(|e| (e.id, e.amount.max(0) as u64))
        .collect();

    let mut expired_total = 0;
    for (credit_id, amount) in lapsed {
        let take = amount.min(account.points.current);
        if take == 0 {
            // Still record the lapse so the credit is not revisited.
            account.points_history.push(expired_entry(credit_id, 0, now));
            continue;
        }
        account.points.current -= take;
        account.points.expired += take;
        expired_total += take;
        account
            .points_history
            .push(expired_entry(credit_id, take as i64, now));
    }

    expired_total
}

/// Point movements in the history entries appended after the first `from`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerDelta {
    pub awarded: u64,
    pub spent: u64,
    pub expired: u64,
}

impl LedgerDelta {
    pub fn since(account: &Account, from: usize) -> Self {
        let mut delta = Self::default();
        for entry in account.points_history.iter().skip(from) {
            let amount = entry.amount.unsigned_abs();
            match entry.entry_type {
                EntryType::Earned | EntryType::Bonus | EntryType::Adjustment => {
                    delta.awarded += amount
                }
                EntryType::Spent => delta.spent += amount,
                EntryType::Expired => delta.expired += amount,
            }
        }
        delta
    }

    /// Publish the movements. Call once per committed write.
    pub fn record(&self) {
        if self.awarded > 0 {
            metrics::counter!("loyalty.points_awarded").increment(self.awarded);
        }
        if self.spent > 0 {
            metrics::counter!("loyalty.points_spent").increment(self.spent);
        }
        if self.expired > 0 {
            metrics::counter!("loyalty.points_expired").increment(self.expired);
        }
    }
}

fn expired_entry(credit_id: Uuid, amount: i64, now: DateTime<Utc>) -> PointsEntry {
    PointsEntry {
        id: Uuid::new_v4(),
        entry_type: EntryType::Expired,
        amount: -amount,
        description: "Points expired".to_string(),
        source: PointsSource::Adjustment,
        source_id: Some(credit_id.to_string()),
        date: now,
        expires_at: None,
    }
}
