//! Persistence contract for progression snapshots.

use serde::{Deserialize, Serialize};

use chrono::{DateTime, Utc};

use crate::achievements::AchievementUnlock;
use crate::error::Result;
use crate::events::EventType;
use crate::quest::QuestRecord;
use crate::xp::XpEntry;

/// Stored counter for one achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub achievement_id: String,
    pub value: u64,
}

/// An event with a reference id that has already been counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub event_type: EventType,
    pub reference_id: String,
    pub processed_at: DateTime<Utc>,
}

/// Everything the engine needs to rehydrate a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProgression {
    pub quests: Vec<QuestRecord>,
    pub xp_entries: Vec<XpEntry>,
    pub achievement_progress: Vec<ProgressRecord>,
    pub achievement_unlocks: Vec<AchievementUnlock>,
    #[serde(default)]
    pub processed_events: Vec<ProcessedEvent>,
}

/// Durable home for progression state.
///
/// Saves are delivered through the outbox and may be retried, so every
/// implementation must treat a repeated save as harmless.
pub trait ProgressStore {
    fn load_progression_state(&self, user_id: &str) -> Result<StoredProgression>;

    fn save_quest_start(&self, user_id: &str, quest_number: u8, started_at: DateTime<Utc>) -> Result<()>;

    fn save_quest_completion(
        &self,
        user_id: &str,
        quest_number: u8,
        xp_awarded: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<()>;

    fn save_xp_entry(&self, user_id: &str, entry: &XpEntry) -> Result<()>;

    /// Counters must never be lowered by a late retry.
    fn save_achievement_progress(&self, user_id: &str, achievement_id: &str, value: u64) -> Result<()>;

    fn save_achievement_unlock(
        &self,
        user_id: &str,
        achievement_id: &str,
        xp_awarded: u32,
        unlocked_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Repeats of the same `(event_type, reference_id)` pair are ignored.
    fn save_processed_event(
        &self,
        user_id: &str,
        event_type: &EventType,
        reference_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<()>;
}
