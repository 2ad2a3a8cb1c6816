//! Achievement rule evaluation.
//!
//! Evaluates events against the registry, flips matching definitions to
//! unlocked and grants their XP through the ledger.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AchievementDefinition, AchievementRegistry, AchievementTracker};
use crate::events::{EventContext, EventType};
use crate::xp::{XpAward, XpLedger};

/// A definition unlocked during one `check_achievements` call.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockedAchievement {
    pub achievement: AchievementDefinition,
    pub xp_awarded: u32,
    #[serde(skip)]
    pub award: Option<XpAward>,
}

/// Counter change produced by `increment_progress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressChange {
    pub achievement_id: String,
    pub value: u64,
}

/// Rule engine over a fixed registry.
#[derive(Debug, Clone, Default)]
pub struct AchievementEngine {
    registry: AchievementRegistry,
}

impl AchievementEngine {
    pub fn new(registry: AchievementRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AchievementRegistry {
        &self.registry
    }

    /// Bump the counter of every counter-based definition listening to
    /// `event_type`. Unlocked definitions keep counting.
    pub fn increment_progress(
        &self,
        tracker: &mut AchievementTracker,
        event_type: &EventType,
        amount: u64,
    ) -> Vec<ProgressChange> {
        if amount == 0 {
            return Vec::new();
        }
        self.registry
            .triggered_by(event_type)
            .filter(|d| d.is_counter_based())
            .map(|d| ProgressChange {
                achievement_id: d.id.clone(),
                value: tracker.increment(&d.id, amount),
            })
            .collect()
    }

    /// Unlock every not-yet-unlocked definition for `event_type` whose
    /// condition holds, granting its XP once.
    pub fn check_achievements(
        &self,
        tracker: &mut AchievementTracker,
        ledger: &mut XpLedger,
        event_type: &EventType,
        context: &EventContext,
        at: DateTime<Utc>,
    ) -> Vec<UnlockedAchievement> {
        let mut unlocked = Vec::new();

        for definition in self.registry.triggered_by(event_type) {
            if tracker.is_unlocked(&definition.id) {
                continue;
            }
            if let Err(e) = definition.validate() {
                tracing::warn!(achievement = %definition.id, error = %e, "skipping malformed achievement");
                continue;
            }
            let Some(condition) = definition.condition.as_ref() else {
                continue;
            };
            if !condition.evaluate(context, tracker.counter(&definition.id)) {
                continue;
            }

            // Flip before granting so a definition listed twice cannot pay out twice.
            if !tracker.unlock(&definition.id, definition.xp_reward, at) {
                continue;
            }
            let award = ledger.award(
                definition.xp_reward,
                event_type.clone(),
                Some(definition.id.clone()),
                Some(format!("Achievement unlocked: {}", definition.name)),
                at,
            );
            tracing::info!(
                achievement = %definition.id,
                rarity = ?definition.rarity,
                xp = definition.xp_reward,
                "achievement unlocked"
            );
            unlocked.push(UnlockedAchievement {
                achievement: definition.clone(),
                xp_awarded: definition.xp_reward,
                award: Some(award),
            });
        }

        unlocked
    }
}
