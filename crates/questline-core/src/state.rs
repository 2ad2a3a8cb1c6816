//! In-memory progression state for one user.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::achievements::AchievementTracker;
use crate::events::EventType;
use crate::quest::{QuestLog, QUEST_COUNT};
use crate::storage::StoredProgression;
use crate::sync::OutboxWrite;
use crate::xp::{XpEntry, XpLedger};

/// Quests, XP ledger and achievement progress for a single user.
///
/// Owned by one [`crate::ProgressionEngine`]; mutated only through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressionState {
    pub user_id: String,
    pub quests: QuestLog,
    pub ledger: XpLedger,
    pub achievements: AchievementTracker,
    /// `(event_type, reference_id)` pairs already counted.
    processed: BTreeSet<(EventType, String)>,
}

impl ProgressionState {
    /// Fresh state: quest 1 available, no XP, nothing unlocked.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            quests: QuestLog::new(QUEST_COUNT),
            ledger: XpLedger::new(),
            achievements: AchievementTracker::new(),
            processed: BTreeSet::new(),
        }
    }

    /// Rebuild from a store snapshot.
    pub fn from_stored(user_id: impl Into<String>, stored: StoredProgression) -> Self {
        let mut achievements = AchievementTracker::new();
        for progress in &stored.achievement_progress {
            achievements.restore_counter(&progress.achievement_id, progress.value);
        }
        for unlock in &stored.achievement_unlocks {
            achievements.unlock(&unlock.achievement_id, unlock.xp_awarded, unlock.unlocked_at);
        }

        Self {
            user_id: user_id.into(),
            quests: QuestLog::from_records(QUEST_COUNT, &stored.quests),
            ledger: XpLedger::from_entries(stored.xp_entries),
            achievements,
            processed: stored
                .processed_events
                .into_iter()
                .map(|p| (p.event_type, p.reference_id))
                .collect(),
        }
    }

    pub fn is_processed(&self, event_type: &EventType, reference_id: &str) -> bool {
        self.processed
            .contains(&(event_type.clone(), reference_id.to_string()))
    }

    /// Record a referenced event. Returns `false` if it was already known.
    pub fn mark_processed(&mut self, event_type: &EventType, reference_id: &str) -> bool {
        self.processed
            .insert((event_type.clone(), reference_id.to_string()))
    }

    /// Apply a write that the store has not seen yet. Each write is
    /// idempotent against state that already reflects it.
    pub fn replay(&mut self, write: &OutboxWrite) {
        match write {
            OutboxWrite::QuestStarted {
                quest_number,
                started_at,
            } => {
                self.quests.start(*quest_number, *started_at);
            }
            OutboxWrite::QuestCompleted {
                quest_number,
                xp_awarded,
                completed_at,
            } => {
                self.quests.complete(*quest_number, *xp_awarded, *completed_at);
            }
            OutboxWrite::XpEntry { entry } => {
                self.restore_entry(entry);
            }
            OutboxWrite::AchievementProgress {
                achievement_id,
                value,
            } => {
                self.achievements.restore_counter(achievement_id, *value);
            }
            OutboxWrite::AchievementUnlocked {
                achievement_id,
                xp_awarded,
                unlocked_at,
            } => {
                self.achievements.unlock(achievement_id, *xp_awarded, *unlocked_at);
            }
            OutboxWrite::EventProcessed {
                event_type,
                reference_id,
                ..
            } => {
                self.mark_processed(event_type, reference_id);
            }
        }
    }

    fn restore_entry(&mut self, entry: &XpEntry) {
        if !self.ledger.restore(entry.clone()) {
            tracing::debug!(entry = %entry.id, "xp entry already present");
        }
    }
}
