//! Escalation tracking
//!
//! Every recorded violation bumps the author's cumulative count, and the
//! count is looked up in a static table of sanctions. A user's tier only
//! moves up until it is explicitly reset.

use chrono::{DateTime, Utc};
use modshield_core::{Error, Result, StateStore, StateStoreExt, UserId, Violation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Store key for administrative escalation resets
pub const RESETS_KEY: &str = "escalation_resets";

/// Sanction applied at an escalation tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Sanction {
    /// Warning only
    Warn,
    /// Temporary mute
    Mute {
        /// Mute length in minutes
        minutes: u64,
    },
    /// Permanent ban
    Ban,
}

impl Sanction {
    /// Ordering key: kind first, then duration
    pub fn rank(&self) -> (u8, u64) {
        match self {
            Self::Warn => (0, 0),
            Self::Mute { minutes } => (1, *minutes),
            Self::Ban => (2, 0),
        }
    }

    /// Mute length, if any
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Mute { minutes } => Some(Duration::from_secs(minutes * 60)),
            _ => None,
        }
    }

    /// Whether this sanction is permanent
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Ban)
    }
}

impl fmt::Display for Sanction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warn => f.write_str("warn"),
            Self::Mute { minutes } => write!(f, "mute {}m", minutes),
            Self::Ban => f.write_str("ban"),
        }
    }
}

/// One row of the escalation table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    /// Lowest cumulative violation count this rule covers
    pub min_count: u32,

    /// Sanction at this tier
    #[serde(flatten)]
    pub sanction: Sanction,
}

impl EscalationRule {
    /// Create a rule
    pub fn new(min_count: u32, sanction: Sanction) -> Self {
        Self {
            min_count,
            sanction,
        }
    }
}

/// Ordered escalation table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<EscalationRule>", into = "Vec<EscalationRule>")]
pub struct EscalationTable {
    rules: Vec<EscalationRule>,
}

impl EscalationTable {
    /// Build a table. Rules must start at count 1, have strictly increasing
    /// counts and never lighten the sanction.
    pub fn new(rules: Vec<EscalationRule>) -> Result<Self> {
        let first = rules
            .first()
            .ok_or_else(|| Error::config("escalation table is empty"))?;
        if first.min_count != 1 {
            return Err(Error::config("escalation table must start at count 1"));
        }

        for pair in rules.windows(2) {
            if pair[1].min_count <= pair[0].min_count {
                return Err(Error::config(format!(
                    "escalation counts must increase ({} after {})",
                    pair[1].min_count, pair[0].min_count
                )));
            }
            if pair[1].sanction.rank() < pair[0].sanction.rank() {
                return Err(Error::config(format!(
                    "escalation at count {} ({}) is lighter than the tier before it ({})",
                    pair[1].min_count, pair[1].sanction, pair[0].sanction
                )));
            }
        }

        Ok(Self { rules })
    }

    /// Rules in order
    pub fn rules(&self) -> &[EscalationRule] {
        &self.rules
    }

    /// Tier index for a cumulative count; `None` for zero
    pub fn tier_for(&self, count: usize) -> Option<usize> {
        self.rules
            .iter()
            .rposition(|rule| rule.min_count as usize <= count)
    }

    /// Rule at a tier index
    pub fn rule(&self, tier: usize) -> Option<&EscalationRule> {
        self.rules.get(tier)
    }
}

impl Default for EscalationTable {
    fn default() -> Self {
        Self {
            rules: vec![
                EscalationRule::new(1, Sanction::Warn),
                EscalationRule::new(3, Sanction::Mute { minutes: 10 }),
                EscalationRule::new(4, Sanction::Mute { minutes: 60 }),
                EscalationRule::new(5, Sanction::Mute { minutes: 24 * 60 }),
                EscalationRule::new(6, Sanction::Ban),
            ],
        }
    }
}

impl TryFrom<Vec<EscalationRule>> for EscalationTable {
    type Error = Error;

    fn try_from(rules: Vec<EscalationRule>) -> Result<Self> {
        Self::new(rules)
    }
}

impl From<EscalationTable> for Vec<EscalationRule> {
    fn from(table: EscalationTable) -> Self {
        table.rules
    }
}

/// A user's violations and escalation tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHistory {
    /// Recorded violations, oldest first
    pub violations: Vec<Violation>,

    /// Current tier index into the escalation table
    pub tier: Option<usize>,
}

impl UserHistory {
    /// Cumulative violation count
    pub fn count(&self) -> usize {
        self.violations.len()
    }
}

/// Per-user violation counting and escalation
#[derive(Debug, Default)]
pub struct EscalationTracker {
    table: EscalationTable,
    users: Mutex<HashMap<UserId, UserHistory>>,
}

impl EscalationTracker {
    /// Create a tracker over a table
    pub fn new(table: EscalationTable) -> Self {
        Self {
            table,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Replay previously recorded violations
    pub fn rebuild(&self, violations: impl IntoIterator<Item = Violation>) {
        let mut replayed = 0;
        for violation in violations {
            self.record(violation);
            replayed += 1;
        }
        info!(violations = replayed, users = self.user_count(), "Escalation history rebuilt");
    }

    /// The escalation table
    pub fn table(&self) -> &EscalationTable {
        &self.table
    }

    /// Record a violation and return the author's resulting escalation.
    ///
    /// The count and tier update happen under one lock, so concurrent
    /// violations from the same user are never lost or double counted.
    pub fn record(&self, violation: Violation) -> EscalationRule {
        let user_id = violation.user_id;
        let mut users = self.users.lock();
        let history = users.entry(user_id).or_default();
        history.violations.push(violation);

        let tier = self.table.tier_for(history.count()).unwrap_or(0);
        let tier = history.tier.map_or(tier, |current| current.max(tier));
        history.tier = Some(tier);

        let rule = self.table.rules[tier];
        debug!(
            user = user_id,
            count = history.count(),
            sanction = %rule.sanction,
            "Violation recorded"
        );
        rule
    }

    /// Current escalation for a user; `None` if they have no violations
    pub fn escalate(&self, user_id: UserId) -> Option<EscalationRule> {
        let users = self.users.lock();
        let tier = users.get(&user_id)?.tier?;
        self.table.rule(tier).copied()
    }

    /// Cumulative violation count
    pub fn count(&self, user_id: UserId) -> usize {
        self.users.lock().get(&user_id).map_or(0, UserHistory::count)
    }

    /// Snapshot of a user's history
    pub fn history(&self, user_id: UserId) -> Option<UserHistory> {
        self.users.lock().get(&user_id).cloned()
    }

    /// Administrative reset; returns whether the user had a history
    pub fn reset(&self, user_id: UserId) -> bool {
        let removed = self.users.lock().remove(&user_id).is_some();
        if removed {
            info!(user = user_id, "Escalation reset");
        }
        removed
    }

    /// Number of users with a history
    pub fn user_count(&self) -> usize {
        self.users.lock().len()
    }
}

/// When each user's escalation was last reset.
///
/// Violations at or before a user's reset time are not replayed into the
/// tracker, so a reset survives a rebuild from the violation log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResetLedger {
    resets: HashMap<UserId, DateTime<Utc>>,
}

impl ResetLedger {
    /// Load from a state store; missing state yields an empty ledger
    pub fn load(store: &dyn StateStore) -> Result<Self> {
        Ok(store.load_as(RESETS_KEY)?.unwrap_or_default())
    }

    /// Persist to a state store
    pub fn save(&self, store: &dyn StateStore) -> Result<()> {
        store.save_as(RESETS_KEY, self)
    }

    /// Record a reset of `user_id` at `at`
    pub fn mark(&mut self, user_id: UserId, at: DateTime<Utc>) {
        self.resets.insert(user_id, at);
    }

    /// Last reset of a user, if any
    pub fn reset_at(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.resets.get(&user_id).copied()
    }

    /// Whether a logged violation still counts toward escalation
    pub fn counts(&self, violation: &Violation) -> bool {
        self.reset_at(violation.user_id)
            .map_or(true, |at| violation.timestamp > at)
    }
}
