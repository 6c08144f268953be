//! Persistence seam for the loyalty engine.
//!
//! `AccountStore` exposes a conditional write keyed on `Account::version`;
//! the engine loads a snapshot, mutates a copy and commits with
//! `compare_and_swap`, retrying on `Conflict`. The in-memory implementations
//! are DashMap-backed for development and tests; a database-backed store
//! implements the same trait with `UPDATE ... WHERE version = $expected`.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dinepoints_core::account::Account;
use dinepoints_core::error::{LoyaltyError, LoyaltyResult};
use dinepoints_core::program::{self, Program, RewardDefinition};
use tracing::{debug, info};

// ─── Accounts ───────────────────────────────────────────────────────────────

pub trait AccountStore: Send + Sync {
    fn get(&self, user_id: &str) -> LoyaltyResult<Option<Account>>;

    /// Create an account. Fails with `InvalidState` if the user already has one.
    fn insert(&self, account: Account) -> LoyaltyResult<()>;

    /// Replace the stored account only if its version still equals
    /// `expected_version`; otherwise fail with `Conflict`.
    fn compare_and_swap(&self, expected_version: u64, account: Account) -> LoyaltyResult<()>;

    fn list(&self) -> LoyaltyResult<Vec<Account>>;
}

/// Thread-safe in-memory account store. One entry per user id.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<String, Account>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        info!("Account store initialized (in-memory, development mode)");
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn get(&self, user_id: &str) -> LoyaltyResult<Option<Account>> {
        Ok(self.accounts.get(user_id).map(|r| r.value().clone()))
    }

    fn insert(&self, account: Account) -> LoyaltyResult<()> {
        match self.accounts.entry(account.user_id.clone()) {
            Entry::Occupied(_) => Err(LoyaltyError::invalid_state(format!(
                "user {} is already enrolled",
                account.user_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(account);
                Ok(())
            }
        }
    }

    fn compare_and_swap(&self, expected_version: u64, account: Account) -> LoyaltyResult<()> {
        let mut stored = self
            .accounts
            .get_mut(&account.user_id)
            .ok_or_else(|| LoyaltyError::not_found(format!("account {}", account.user_id)))?;
        if stored.version != expected_version {
            debug!(
                user_id = %account.user_id,
                expected = expected_version,
                found = stored.version,
                "Version mismatch on account write"
            );
            return Err(LoyaltyError::Conflict(format!("account {}", account.user_id)));
        }
        *stored = account;
        Ok(())
    }

    fn list(&self) -> LoyaltyResult<Vec<Account>> {
        Ok(self.accounts.iter().map(|r| r.value().clone()).collect())
    }
}

// ─── Programs ───────────────────────────────────────────────────────────────

/// Authoritative program records. Owns the catalog redemption counters, so
/// every cap check that precedes a debit goes through here rather than
/// through a cached snapshot.
#[derive(Default)]
pub struct ProgramStore {
    programs: DashMap<String, Program>,
}

impl ProgramStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_programs(programs: Vec<Program>) -> LoyaltyResult<Self> {
        let store = Self::new();
        for program in programs {
            store.upsert(program)?;
        }
        Ok(store)
    }

    pub fn upsert(&self, program: Program) -> LoyaltyResult<()> {
        program.validate()?;
        info!(
            program_id = %program.id,
            active = program.is_active,
            tiers = program.tiers.len(),
            rewards = program.rewards.len(),
            "Program loaded"
        );
        self.programs.insert(program.id.clone(), program);
        Ok(())
    }

    pub fn get(&self, program_id: &str) -> Option<Program> {
        self.programs.get(program_id).map(|r| r.value().clone())
    }

    /// The active program under the deterministic selection rule.
    pub fn active(&self) -> LoyaltyResult<Program> {
        let all: Vec<Program> = self.programs.iter().map(|r| r.value().clone()).collect();
        program::select_active(&all).cloned()
    }

    /// Take one redemption slot of `reward_id`. Checks availability and bumps
    /// `current_redemptions` under the record's write lock, so concurrent
    /// callers can never push a reward past `max_redemptions`.
    pub fn reserve_redemption(
        &self,
        program_id: &str,
        reward_id: &str,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<RewardDefinition> {
        let mut program = self
            .programs
            .get_mut(program_id)
            .ok_or_else(|| LoyaltyError::not_found(format!("program {program_id}")))?;
        let reward = program
            .rewards
            .get_mut(reward_id)
            .ok_or_else(|| LoyaltyError::not_found(format!("reward {reward_id}")))?;
        if !reward.is_available_at(now) {
            return Err(LoyaltyError::invalid_state(format!(
                "reward {reward_id} is not available"
            )));
        }
        reward.current_redemptions += 1;
        Ok(reward.clone())
    }

    /// Give back a slot taken by `reserve_redemption` when the debit failed.
    pub fn release_redemption(&self, program_id: &str, reward_id: &str) {
        if let Some(mut program) = self.programs.get_mut(program_id) {
            if let Some(reward) = program.rewards.get_mut(reward_id) {
                reward.current_redemptions = reward.current_redemptions.saturating_sub(1);
            }
        }
    }
}

// ─── Redemption codes ───────────────────────────────────────────────────────

/// System-wide registry of issued redemption codes.
#[derive(Default)]
pub struct CodeRegistry {
    codes: DashMap<String, String>,
}

impl CodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the first generated code not yet issued, trying at most `attempts` times.
    pub fn claim_unique(
        &self,
        user_id: &str,
        attempts: u32,
        mut generate: impl FnMut() -> String,
    ) -> LoyaltyResult<String> {
        for _ in 0..attempts.max(1) {
            let code = generate();
            if let Entry::Vacant(slot) = self.codes.entry(code.clone()) {
                slot.insert(user_id.to_string());
                return Ok(code);
            }
            metrics::counter!("loyalty.code_collisions").increment(1);
        }
        Err(LoyaltyError::Internal(anyhow::anyhow!(
            "could not generate a unique redemption code in {attempts} attempts"
        )))
    }

    pub fn release(&self, code: &str) {
        self.codes.remove(code);
    }

    pub fn owner(&self, code: &str) -> Option<String> {
        self.codes.get(code).map(|r| r.value().clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_unique_per_user() {
        let store = InMemoryAccountStore::new();
        let now = Utc::now();
        store.insert(Account::new("u1", "Bronze", 1, now)).unwrap();
        let dup = store.insert(Account::new("u1", "Bronze", 1, now));
        assert!(matches!(dup, Err(LoyaltyError::InvalidState(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_compare_and_swap_detects_stale_version() {
        let store = InMemoryAccountStore::new();
        store
            .insert(Account::new("u1", "Bronze", 1, Utc::now()))
            .unwrap();

        let mut first = store.get("u1").unwrap().unwrap();
        let mut second = first.clone();

        first.points.current = 10;
        first.version = 1;
        store.compare_and_swap(0, first).unwrap();

        second.points.current = 99;
        second.version = 1;
        let stale = store.compare_and_swap(0, second);
        assert!(matches!(stale, Err(LoyaltyError::Conflict(_))));
        assert_eq!(store.get("u1").unwrap().unwrap().points.current, 10);
    }

    #[test]
    fn test_compare_and_swap_missing_account() {
        let store = InMemoryAccountStore::new();
        let result = store.compare_and_swap(0, Account::new("ghost", "Bronze", 1, Utc::now()));
        assert!(matches!(result, Err(LoyaltyError::NotFound(_))));
    }

    #[test]
    fn test_reserve_redemption_respects_cap() {
        let mut program = Program::demo();
        program.rewards.get_mut("free-dessert").unwrap().max_redemptions = Some(1);
        let store = ProgramStore::with_programs(vec![program]).unwrap();
        let now = Utc::now();

        let reward = store.reserve_redemption("default", "free-dessert", now).unwrap();
        assert_eq!(reward.current_redemptions, 1);
        let second = store.reserve_redemption("default", "free-dessert", now);
        assert!(matches!(second, Err(LoyaltyError::InvalidState(_))));

        store.release_redemption("default", "free-dessert");
        assert!(store.reserve_redemption("default", "free-dessert", now).is_ok());
        assert!(matches!(
            store.reserve_redemption("default", "nope", now),
            Err(LoyaltyError::NotFound(_))
        ));
    }

    #[test]
    fn test_active_program_from_store() {
        let store = ProgramStore::new();
        assert!(matches!(store.active(), Err(LoyaltyError::NotFound(_))));
        store.upsert(Program::demo()).unwrap();
        assert_eq!(store.active().unwrap().id, "default");
    }

    #[test]
    fn test_code_registry_retries_on_collision() {
        let registry = CodeRegistry::new();
        let taken = registry.claim_unique("u1", 3, || "AAAA1111".to_string()).unwrap();
        assert_eq!(taken, "AAAA1111");

        let mut candidates = vec!["BBBB2222".to_string(), "AAAA1111".to_string()];
        let next = registry
            .claim_unique("u2", 3, || candidates.pop().unwrap())
            .unwrap();
        assert_eq!(next, "BBBB2222");
        assert_eq!(registry.owner("BBBB2222").as_deref(), Some("u2"));

        let exhausted = registry.claim_unique("u3", 2, || "AAAA1111".to_string());
        assert!(matches!(exhausted, Err(LoyaltyError::Internal(_))));
    }
}
