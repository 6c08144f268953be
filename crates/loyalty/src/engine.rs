//! Loyalty engine: transactional point awards, spends, challenge claims and
//! reward redemption over versioned accounts.
//!
//! Every read-then-write of an account runs through `transact`: load a
//! snapshot, apply the operation to a copy, commit with a version check, and
//! retry a bounded number of times on `Conflict`. An operation either commits
//! whole or leaves the stored account untouched. Notifications go out only
//! after commit and their failure is logged, never propagated.

use crate::challenge;
use crate::ledger::{self, Credit, LedgerDelta};
use crate::redemption::{self, RedeemReceipt, RedeemRequest};
use crate::store::{AccountStore, CodeRegistry, InMemoryAccountStore, ProgramStore};
use crate::streak::{self, StreakUpdate};
use crate::tier::{self, TierChange};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use dinepoints_cache::LocalCache;
use dinepoints_core::account::{
    Account, AccountStatus, ActivityKind, ChallengePeriod, EntryType, PointsSource, RedeemedReward,
    StreakKind,
};
use dinepoints_core::config::EngineConfig;
use dinepoints_core::error::{LoyaltyError, LoyaltyResult};
use dinepoints_core::events::{
    BookingCompleted, CheckinOccurred, Notification, Notifier, NotifyKind, ReferralConfirmed,
    ReviewSubmitted,
};
use dinepoints_core::program::Program;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const ACTIVE_PROGRAM_KEY: &str = "active";

// ─── Requests & receipts ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollRequest {
    pub user_id: String,
    #[serde(default)]
    pub premium: bool,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
}

/// Result of an activity award and its cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardReceipt {
    pub user_id: String,
    pub source: PointsSource,
    pub points_awarded: u64,
    pub new_balance: u64,
    pub total_points: u64,
    pub tier: String,
    pub tier_change: Option<TierChange>,
    pub streak_bonus: u64,
    pub completed_challenges: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub user_id: String,
    pub challenge_id: String,
    pub points_awarded: u64,
    pub new_balance: u64,
    pub tier_change: Option<TierChange>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Occasion {
    Birthday,
    Anniversary,
}

/// One qualifying activity and the credit it earns.
struct ActivityAward {
    kind: ActivityKind,
    source: PointsSource,
    points: u64,
    source_id: String,
    description: String,
    streak: Option<StreakKind>,
}

/// Counters for a committed write, derived from the difference between the
/// stored snapshot and the account that replaced it.
fn record_commit(before: &Account, after: &Account) {
    LedgerDelta::since(after, before.points_history.len()).record();
    if after.tier.level > before.tier.level {
        metrics::counter!("loyalty.tier_upgrades").increment(1);
    }
}

// ─── Engine ─────────────────────────────────────────────────────────────────

pub struct LoyaltyEngine {
    pub(crate) config: EngineConfig,
    pub(crate) accounts: Arc<dyn AccountStore>,
    pub(crate) programs: Arc<ProgramStore>,
    codes: CodeRegistry,
    program_cache: LocalCache<Program>,
    notifier: Arc<dyn Notifier>,
}

impl LoyaltyEngine {
    pub fn new(
        config: &EngineConfig,
        accounts: Arc<dyn AccountStore>,
        programs: Arc<ProgramStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        info!(
            max_conflict_retries = config.max_conflict_retries,
            program_cache_ttl_secs = config.program_cache_ttl_secs,
            "Loyalty engine initialized"
        );
        Self {
            config: config.clone(),
            accounts,
            programs,
            codes: CodeRegistry::new(),
            program_cache: LocalCache::new(Duration::from_secs(config.program_cache_ttl_secs), 16),
            notifier,
        }
    }

    /// Engine over fresh in-memory stores seeded with `program`.
    pub fn in_memory(
        config: &EngineConfig,
        program: Program,
        notifier: Arc<dyn Notifier>,
    ) -> LoyaltyResult<Self> {
        let programs = Arc::new(ProgramStore::with_programs(vec![program])?);
        Ok(Self::new(
            config,
            Arc::new(InMemoryAccountStore::new()),
            programs,
            notifier,
        ))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn programs(&self) -> &Arc<ProgramStore> {
        &self.programs
    }

    /// Active program snapshot, served from the TTL cache.
    pub fn program(&self) -> LoyaltyResult<Program> {
        self.program_cache
            .get_or_try_load(ACTIVE_PROGRAM_KEY, || self.programs.active())
    }

    /// Drop the cached program so the next read goes to the store.
    pub fn invalidate_program(&self) {
        self.program_cache.invalidate(ACTIVE_PROGRAM_KEY);
    }

    /// Periodic maintenance (cache eviction).
    pub fn maintenance(&self) {
        let evicted = self.program_cache.evict_expired();
        if evicted > 0 {
            debug!(evicted, "Program cache eviction complete");
        }
    }

    pub(crate) fn load(&self, user_id: &str) -> LoyaltyResult<Account> {
        self.accounts
            .get(user_id)?
            .ok_or_else(|| LoyaltyError::not_found(format!("account {user_id}")))
    }

    /// Run `op` against a copy of the account and commit it with a version
    /// check. Only `Conflict` is retried.
    fn transact<T>(
        &self,
        user_id: &str,
        mut op: impl FnMut(&mut Account) -> LoyaltyResult<T>,
    ) -> LoyaltyResult<(T, Account)> {
        let mut retries = 0;
        loop {
            let snapshot = self.load(user_id)?;
            let mut working = snapshot.clone();
            let out = op(&mut working)?;
            working.version = snapshot.version + 1;

            match self
                .accounts
                .compare_and_swap(snapshot.version, working.clone())
            {
                Ok(()) => {
                    record_commit(&snapshot, &working);
                    return Ok((out, working));
                }
                Err(e) if e.is_retryable() && retries < self.config.max_conflict_retries => {
                    retries += 1;
                    metrics::counter!("loyalty.conflict_retries").increment(1);
                    warn!(user_id, attempt = retries, "Account write conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Tier and catalog bookkeeping that follows every balance change.
    fn settle(
        &self,
        account: &mut Account,
        program: &Program,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<Option<TierChange>> {
        let change = tier::evaluate(account, program, self.config.tier_upgrade_bonus, now)?;
        redemption::refresh_available(account, program, now);
        Ok(change)
    }

    fn dispatch(&self, notification: Notification) {
        let user_id = notification.user_id.clone();
        let kind = notification.kind;
        if let Err(e) = self.notifier.notify(notification) {
            metrics::counter!("loyalty.notify_failures").increment(1);
            warn!(user_id = %user_id, kind = ?kind, error = %e, "Notification dispatch failed");
        }
    }

    fn notify_earned(&self, account: &Account, points: u64, source: PointsSource, tier_change: Option<&TierChange>) {
        if points == 0 {
            return;
        }
        self.dispatch(Notification::new(
            account.user_id.clone(),
            NotifyKind::PointsEarned,
            serde_json::json!({
                "points": points,
                "source": source,
                "balance": account.points.current,
                "tier": account.tier.current,
                "tier_upgraded": tier_change.is_some(),
            }),
        ));
    }

    // ─── Membership ────────────────────────────────────────────────────────

    /// Create an account in the entry tier and grant the welcome bonus.
    pub fn enroll(&self, request: &EnrollRequest) -> LoyaltyResult<Account> {
        if request.user_id.trim().is_empty() {
            return Err(LoyaltyError::validation("user_id must not be empty"));
        }
        let program = self.program()?;
        let base = program
            .base_tier()
            .ok_or_else(|| LoyaltyError::Config(format!("program {} has no tiers", program.id)))?;
        let now = Utc::now();

        let mut account = Account::new(request.user_id.clone(), &base.name, base.level, now);
        account.membership.is_premium = request.premium;
        account.membership.premium_since = request.premium.then_some(now);
        account.membership.birthday = request.birthday;

        let bonus = program.settings.welcome_bonus;
        if bonus > 0 {
            ledger::credit(
                &mut account,
                Credit::new(bonus, PointsSource::Bonus, "Welcome bonus")
                    .source_id("welcome")
                    .expires_at(program.expiry_for(now)),
                now,
            )?;
        }
        self.settle(&mut account, &program, now)?;
        self.accounts.insert(account.clone())?;
        LedgerDelta::since(&account, 0).record();

        info!(user_id = %account.user_id, tier = %account.tier.current, bonus, "Member enrolled");
        self.notify_earned(&account, bonus, PointsSource::Bonus, None);
        Ok(account)
    }

    pub fn set_status(&self, user_id: &str, status: AccountStatus) -> LoyaltyResult<Account> {
        let (_, account) = self.transact(user_id, |acct| {
            acct.status = status;
            Ok(())
        })?;
        info!(user_id, status = ?status, "Account status changed");
        Ok(account)
    }

    // ─── Ledger ────────────────────────────────────────────────────────────

    /// Credit `amount` earned or bonus points. Returns the balance after the
    /// credit and any tier-upgrade bonus it triggered. `Adjustment` and
    /// `Redemption` are not earning sources and are rejected.
    pub fn add_points(
        &self,
        user_id: &str,
        amount: i64,
        source: PointsSource,
        description: &str,
        source_id: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> LoyaltyResult<u64> {
        let amount = ledger::positive_amount(amount)?;
        if !matches!(source.credit_type(), EntryType::Earned | EntryType::Bonus) {
            return Err(LoyaltyError::validation(format!(
                "{source:?} is not an earning source"
            )));
        }
        let program = self.program()?;
        let now = Utc::now();
        let expires_at = expires_at.or_else(|| program.expiry_for(now));

        let (tier_change, account) = self.transact(user_id, |acct| {
            let mut credit = Credit::new(amount, source, description).expires_at(expires_at);
            credit.source_id = source_id.clone();
            ledger::credit(acct, credit, now)?;
            self.settle(acct, &program, now)
        })?;

        debug!(user_id, amount, source = ?source, balance = account.points.current, "Points added");
        self.notify_earned(&account, amount, source, tier_change.as_ref());
        Ok(account.points.current)
    }

    /// Debit `amount` points. Fails with `InsufficientPoints` and leaves the
    /// balance unchanged when it does not cover the amount.
    pub fn spend_points(
        &self,
        user_id: &str,
        amount: i64,
        description: &str,
        source_id: Option<String>,
    ) -> LoyaltyResult<u64> {
        let amount = ledger::positive_amount(amount)?;
        let program = self.program()?;
        let now = Utc::now();

        let (_, account) = self.transact(user_id, |acct| {
            ledger::debit(acct, amount, PointsSource::Redemption, description, source_id.clone(), now)?;
            self.settle(acct, &program, now)
        })?;

        debug!(user_id, amount, balance = account.points.current, "Points spent");
        Ok(account.points.current)
    }

    /// Expire lapsed credits as of `now`. Returns points expired.
    pub fn expire_points(&self, user_id: &str, now: DateTime<Utc>) -> LoyaltyResult<u64> {
        let program = self.program()?;
        let (expired, _) = self.transact(user_id, |acct| {
            let expired = ledger::expire(acct, now);
            self.settle(acct, &program, now)?;
            Ok(expired)
        })?;
        if expired > 0 {
            info!(user_id, expired, "Points expired");
        }
        Ok(expired)
    }

    /// Birthday or anniversary bonus, at most once per calendar year.
    pub fn grant_occasion_bonus(
        &self,
        user_id: &str,
        occasion: Occasion,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<u64> {
        let program = self.program()?;
        let (amount, label) = match occasion {
            Occasion::Birthday => (program.settings.birthday_bonus, "birthday"),
            Occasion::Anniversary => (program.settings.anniversary_bonus, "anniversary"),
        };
        if amount == 0 {
            return Err(LoyaltyError::invalid_state(format!("no {label} bonus configured")));
        }
        let source_id = format!("{label}:{}", now.year());

        let (tier_change, account) = self.transact(user_id, |acct| {
            if acct.has_award(PointsSource::Bonus, &source_id) {
                return Err(LoyaltyError::invalid_state(format!(
                    "{label} bonus already granted for {}",
                    now.year()
                )));
            }
            ledger::credit(
                acct,
                Credit::new(amount, PointsSource::Bonus, format!("Happy {label}!"))
                    .source_id(source_id.clone())
                    .expires_at(program.expiry_for(now)),
                now,
            )?;
            self.settle(acct, &program, now)
        })?;

        self.notify_earned(&account, amount, PointsSource::Bonus, tier_change.as_ref());
        Ok(account.points.current)
    }

    // ─── Streaks & challenges ──────────────────────────────────────────────

    pub fn update_streak(
        &self,
        user_id: &str,
        kind: StreakKind,
        increment: bool,
    ) -> LoyaltyResult<StreakUpdate> {
        let program = self.program()?;
        let now = Utc::now();
        let (update, _) = self.transact(user_id, |acct| {
            let update = streak::update(acct, kind, increment, &program.gamification.streaks, now)?;
            if update.bonus > 0 {
                self.settle(acct, &program, now)?;
            }
            Ok(update)
        })?;
        Ok(update)
    }

    /// Reset every streak that has gone `grace_days` without activity as of
    /// `now`. Returns the streaks that were reset; nothing is written when
    /// none lapsed.
    pub fn reset_lapsed_streaks(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<Vec<StreakUpdate>> {
        let program = self.program()?;
        let config = &program.gamification.streaks;
        let lapsed = |acct: &Account| -> Vec<StreakKind> {
            StreakKind::ALL
                .into_iter()
                .filter(|kind| streak::is_lapsed(acct.streaks.get(*kind), config.grace_days, now))
                .collect()
        };
        if lapsed(&self.load(user_id)?).is_empty() {
            return Ok(Vec::new());
        }

        let (updates, _) = self.transact(user_id, |acct| {
            lapsed(acct)
                .into_iter()
                .map(|kind| streak::update(acct, kind, false, config, now))
                .collect::<LoyaltyResult<Vec<_>>>()
        })?;
        if !updates.is_empty() {
            info!(user_id, reset = updates.len(), "Lapsed streaks reset");
        }
        Ok(updates)
    }

    /// Seed the program's challenge templates for the current periods.
    pub fn assign_challenges(&self, user_id: &str) -> LoyaltyResult<usize> {
        let program = self.program()?;
        let now = Utc::now();
        let (created, _) = self.transact(user_id, |acct| Ok(challenge::assign(acct, &program, now)))?;
        Ok(created)
    }

    /// Advance matching current-period challenges. Returns newly completed ids.
    pub fn update_progress(
        &self,
        user_id: &str,
        activity: ActivityKind,
        amount: u32,
    ) -> LoyaltyResult<Vec<String>> {
        let now = Utc::now();
        let (completed, _) = self.transact(user_id, |acct| {
            challenge::record_progress(acct, activity, amount, now)
        })?;
        Ok(completed)
    }

    /// Claim a completed challenge: mark it claimed and credit its reward in
    /// one commit.
    pub fn claim_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
        period: ChallengePeriod,
    ) -> LoyaltyResult<ClaimReceipt> {
        let program = self.program()?;
        let now = Utc::now();
        let ((points, tier_change), account) = self.transact(user_id, |acct| {
            let points = challenge::claim(acct, challenge_id, period, now)?;
            let tier_change = self.settle(acct, &program, now)?;
            Ok((points, tier_change))
        })?;

        metrics::counter!("loyalty.challenges_claimed").increment(1);
        info!(user_id, challenge_id, points, "Challenge claimed");
        self.notify_earned(&account, points, PointsSource::Challenge, tier_change.as_ref());
        Ok(ClaimReceipt {
            user_id: user_id.to_string(),
            challenge_id: challenge_id.to_string(),
            points_awarded: points,
            new_balance: account.points.current,
            tier_change,
        })
    }

    // ─── Redemption ────────────────────────────────────────────────────────

    /// Exchange points for a reward code.
    ///
    /// The reward is re-validated against the authoritative catalog and a
    /// redemption slot is reserved before the debit commits. If the debit
    /// fails the slot and the code are handed back, so the catalog counter
    /// and the account always agree once the call returns.
    pub fn redeem(&self, request: &RedeemRequest) -> LoyaltyResult<RedeemReceipt> {
        let now = Utc::now();
        let user_id = request.user_id.as_str();
        let key = request.idempotency_key.as_deref();
        if key.is_some_and(|k| k.trim().is_empty()) {
            return Err(LoyaltyError::validation("idempotency_key must not be blank"));
        }

        let account = self.load(user_id)?;
        if let Some(previous) = key.and_then(|k| redemption::replay(&account, k)) {
            return Ok(RedeemReceipt {
                user_id: user_id.to_string(),
                redemption: previous,
                new_balance: account.points.current,
                replayed: true,
            });
        }

        let program = self.programs.active()?;
        let listed = program
            .rewards
            .get(&request.reward_id)
            .ok_or_else(|| LoyaltyError::not_found(format!("reward {}", request.reward_id)))?;
        if !listed.is_available_at(now) {
            return Err(LoyaltyError::invalid_state(format!(
                "reward {} is not available",
                listed.id
            )));
        }
        redemption::check_eligibility(&account, &program, listed.points_cost)?;

        let reward = self
            .programs
            .reserve_redemption(&program.id, &request.reward_id, now)?;
        let code = match self.codes.claim_unique(user_id, self.config.max_code_attempts, || {
            redemption::generate_code(self.config.redemption_code_length)
        }) {
            Ok(code) => code,
            Err(e) => {
                self.programs.release_redemption(&program.id, &reward.id);
                return Err(e);
            }
        };

        let outcome = self.transact(user_id, |acct| {
            if let Some(previous) = key.and_then(|k| redemption::replay(acct, k)) {
                return Ok((previous, true));
            }
            let redeemed = redemption::apply(acct, &program, &reward, &code, key, now)?;
            self.settle(acct, &program, now)?;
            Ok((redeemed, false))
        });

        let ((redeemed, replayed), account) = match outcome {
            Ok(done) => done,
            Err(e) => {
                self.programs.release_redemption(&program.id, &reward.id);
                self.codes.release(&code);
                return Err(e);
            }
        };
        if replayed {
            self.programs.release_redemption(&program.id, &reward.id);
            self.codes.release(&code);
        } else {
            self.invalidate_program();
            metrics::counter!("loyalty.redemptions").increment(1);
            info!(
                user_id,
                reward_id = %reward.id,
                cost = reward.points_cost,
                new_balance = account.points.current,
                "Reward redeemed"
            );
            self.dispatch(Notification::new(
                user_id,
                NotifyKind::RewardRedeemed,
                serde_json::json!({
                    "reward_id": redeemed.reward_id,
                    "name": redeemed.name,
                    "code": redeemed.code,
                    "points_cost": redeemed.points_cost,
                    "expires_at": redeemed.expires_at,
                    "balance": account.points.current,
                }),
            ));
        }

        Ok(RedeemReceipt {
            user_id: user_id.to_string(),
            redemption: redeemed,
            new_balance: account.points.current,
            replayed,
        })
    }

    /// Mark an active code used. A code issued to another member is reported
    /// as not found.
    pub fn mark_redemption_used(&self, user_id: &str, code: &str) -> LoyaltyResult<RedeemedReward> {
        if self.codes.owner(code).is_some_and(|owner| owner != user_id) {
            return Err(LoyaltyError::not_found(format!("redemption {code}")));
        }
        let now = Utc::now();
        let (redeemed, _) = self.transact(user_id, |acct| redemption::mark_used(acct, code, now))?;
        info!(user_id, code, "Redemption code used");
        Ok(redeemed)
    }

    // ─── Inbound events ────────────────────────────────────────────────────

    fn award_activity(
        &self,
        user_id: &str,
        program: &Program,
        award: ActivityAward,
        guard: impl Fn(&Account) -> LoyaltyResult<()>,
    ) -> LoyaltyResult<AwardReceipt> {
        let now = Utc::now();
        let expires_at = program.expiry_for(now);

        let (receipt, account) = self.transact(user_id, |acct| {
            if !acct.is_active() {
                return Err(LoyaltyError::invalid_state(format!(
                    "account {} is {:?}",
                    acct.user_id, acct.status
                )));
            }
            guard(acct)?;

            if award.points > 0 {
                ledger::credit(
                    acct,
                    Credit::new(award.points, award.source, award.description.clone())
                        .source_id(award.source_id.clone())
                        .expires_at(expires_at),
                    now,
                )?;
            }
            acct.activity.record(award.kind, now);

            let streak_bonus = match award.streak {
                Some(kind) => {
                    streak::update(acct, kind, true, &program.gamification.streaks, now)?.bonus
                }
                None => 0,
            };
            let completed_challenges = challenge::record_progress(acct, award.kind, 1, now)?;
            let tier_change = self.settle(acct, program, now)?;

            Ok(AwardReceipt {
                user_id: acct.user_id.clone(),
                source: award.source,
                points_awarded: award.points,
                new_balance: acct.points.current,
                total_points: acct.points.total,
                tier: acct.tier.current.clone(),
                tier_change,
                streak_bonus,
                completed_challenges,
            })
        })?;

        debug!(
            user_id,
            source = ?award.source,
            points = award.points,
            balance = account.points.current,
            "Activity awarded"
        );
        self.notify_earned(
            &account,
            award.points + receipt.streak_bonus,
            award.source,
            receipt.tier_change.as_ref(),
        );
        Ok(receipt)
    }

    pub fn on_booking_completed(&self, event: &BookingCompleted) -> LoyaltyResult<AwardReceipt> {
        if event.booking_id.is_empty() {
            return Err(LoyaltyError::validation("booking_id must not be empty"));
        }
        if !event.amount_paid.is_finite() || event.amount_paid < 0.0 {
            return Err(LoyaltyError::validation(format!(
                "amount_paid must be a non-negative number, got {}",
                event.amount_paid
            )));
        }
        let program = self.program()?;
        let points = program.booking_points(event.amount_paid, event.restaurant_id.as_deref());
        let award = ActivityAward {
            kind: ActivityKind::Booking,
            source: PointsSource::Booking,
            points,
            source_id: event.booking_id.clone(),
            description: format!("Booking {}", event.booking_id),
            streak: Some(StreakKind::Booking),
        };
        self.award_activity(&event.user_id, &program, award, |_| Ok(()))
    }

    pub fn on_review_submitted(&self, event: &ReviewSubmitted) -> LoyaltyResult<AwardReceipt> {
        if event.review_id.is_empty() {
            return Err(LoyaltyError::validation("review_id must not be empty"));
        }
        let program = self.program()?;
        let points = program.review_points(event.restaurant_id.as_deref());
        let award = ActivityAward {
            kind: ActivityKind::Review,
            source: PointsSource::Review,
            points,
            source_id: event.review_id.clone(),
            description: format!("Review {}", event.review_id),
            streak: Some(StreakKind::Review),
        };
        self.award_activity(&event.user_id, &program, award, |_| Ok(()))
    }

    /// At most one check-in award per calendar day.
    pub fn on_checkin(&self, event: &CheckinOccurred) -> LoyaltyResult<AwardReceipt> {
        if event.restaurant_id.is_empty() {
            return Err(LoyaltyError::validation("restaurant_id must not be empty"));
        }
        let program = self.program()?;
        let date = event.date;
        let award = ActivityAward {
            kind: ActivityKind::Checkin,
            source: PointsSource::Checkin,
            points: program.points_config.checkin_points,
            source_id: date.to_string(),
            description: format!("Check-in at {}", event.restaurant_id),
            streak: None,
        };
        self.award_activity(&event.user_id, &program, award, |acct| {
            if acct.has_checkin_on(date) {
                return Err(LoyaltyError::invalid_state(format!("already checked in on {date}")));
            }
            Ok(())
        })
    }

    /// At most one referral award per referred user.
    pub fn on_referral_confirmed(&self, event: &ReferralConfirmed) -> LoyaltyResult<AwardReceipt> {
        if event.referred_user_id.is_empty() {
            return Err(LoyaltyError::validation("referred_user_id must not be empty"));
        }
        if event.referred_user_id == event.user_id {
            return Err(LoyaltyError::validation("users cannot refer themselves"));
        }
        let program = self.program()?;
        let referred = event.referred_user_id.clone();
        let award = ActivityAward {
            kind: ActivityKind::Referral,
            source: PointsSource::Referral,
            points: program.points_config.referral_points,
            source_id: referred.clone(),
            description: format!("Referral of {referred}"),
            streak: None,
        };
        self.award_activity(&event.user_id, &program, award, |acct| {
            if acct.has_award(PointsSource::Referral, &referred) {
                return Err(LoyaltyError::invalid_state(format!(
                    "referral of {referred} already rewarded"
                )));
            }
            Ok(())
        })
    }
}
