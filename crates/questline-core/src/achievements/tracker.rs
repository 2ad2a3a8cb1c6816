//! Per-user achievement progress and unlock state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal unlock record. Exists at most once per achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementUnlock {
    pub achievement_id: String,
    pub xp_awarded: u32,
    pub unlocked_at: DateTime<Utc>,
}

/// Progress counters and unlock flags, keyed by achievement id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementTracker {
    counters: BTreeMap<String, u64>,
    unlocks: BTreeMap<String, AchievementUnlock>,
}

impl AchievementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, achievement_id: &str) -> u64 {
        self.counters.get(achievement_id).copied().unwrap_or(0)
    }

    /// Add `amount` and return the new value. Saturates rather than wraps.
    pub fn increment(&mut self, achievement_id: &str, amount: u64) -> u64 {
        let counter = self.counters.entry(achievement_id.to_string()).or_insert(0);
        *counter = counter.saturating_add(amount);
        *counter
    }

    /// Raise a counter to `value` if higher. Counters never go down.
    pub fn restore_counter(&mut self, achievement_id: &str, value: u64) {
        let counter = self.counters.entry(achievement_id.to_string()).or_insert(0);
        *counter = (*counter).max(value);
    }

    pub fn is_unlocked(&self, achievement_id: &str) -> bool {
        self.unlocks.contains_key(achievement_id)
    }

    /// Flip to unlocked. Returns false if it already was.
    pub fn unlock(&mut self, achievement_id: &str, xp_awarded: u32, at: DateTime<Utc>) -> bool {
        if self.is_unlocked(achievement_id) {
            return false;
        }
        self.unlocks.insert(
            achievement_id.to_string(),
            AchievementUnlock {
                achievement_id: achievement_id.to_string(),
                xp_awarded,
                unlocked_at: at,
            },
        );
        true
    }

    pub fn unlock_record(&self, achievement_id: &str) -> Option<&AchievementUnlock> {
        self.unlocks.get(achievement_id)
    }

    pub fn unlocks(&self) -> impl Iterator<Item = &AchievementUnlock> {
        self.unlocks.values()
    }

    pub fn counters(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counters.iter().map(|(id, v)| (id.as_str(), *v))
    }

    pub fn unlocked_count(&self) -> usize {
        self.unlocks.len()
    }
}
