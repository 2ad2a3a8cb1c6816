//! Achievement definitions.

use serde::{Deserialize, Serialize};

use super::{AchievementError, Condition};
use crate::events::EventType;

/// Prestige tier. Ordered: common < uncommon < rare < epic < legendary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementCategory {
    Onboarding,
    Quest,
    Archetype,
    Community,
    Skills,
}

/// A static registry entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: AchievementCategory,
    pub rarity: Rarity,
    pub xp_reward: u32,
    /// Event types this achievement listens for
    pub triggers: Vec<EventType>,
    /// `None` only for malformed definitions; those never unlock.
    #[serde(default)]
    pub condition: Option<Condition>,
}

impl AchievementDefinition {
    pub fn listens_to(&self, event_type: &EventType) -> bool {
        self.triggers.iter().any(|t| t == event_type)
    }

    /// Counter-based definitions accumulate progress on their triggers.
    pub fn is_counter_based(&self) -> bool {
        self.condition.as_ref().is_some_and(Condition::uses_counter)
    }

    pub fn validate(&self) -> Result<(), AchievementError> {
        if self.id.trim().is_empty() {
            return Err(AchievementError::malformed(&self.id, "id must not be empty"));
        }
        if self.triggers.is_empty() {
            return Err(AchievementError::malformed(&self.id, "no triggers"));
        }
        if self.triggers.iter().any(EventType::is_blank) {
            return Err(AchievementError::malformed(&self.id, "blank trigger tag"));
        }
        let condition = self
            .condition
            .as_ref()
            .ok_or_else(|| AchievementError::malformed(&self.id, "missing condition"))?;
        if let Some(problem) = condition.problem() {
            return Err(AchievementError::malformed(&self.id, problem));
        }
        Ok(())
    }
}
