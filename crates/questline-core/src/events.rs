//! Event vocabulary shared between UI callers and the engine.
//!
//! [`ProgressEvent`] flows in (a user did something), [`Event`] flows out
//! (something changed that the UI may want to celebrate).

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::achievements::{AchievementCategory, Rarity};

/// Tag naming what happened. Open-ended: unknown tags are valid input and
/// simply match no achievement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    pub const QUEST_COMPLETION: EventType = EventType::from_static("quest_completion");
    pub const ARCHETYPE_COMPLETE: EventType = EventType::from_static("archetype_complete");
    pub const HACKATHON_JOIN: EventType = EventType::from_static("hackathon_join");
    pub const GUILD_JOIN: EventType = EventType::from_static("guild_join");
    pub const SKILL_ASSESSMENT_COMPLETE: EventType =
        EventType::from_static("skill_assessment_complete");
    pub const MANUAL: EventType = EventType::from_static("manual");

    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        Self::new(tag)
    }
}

/// Free-form key/value payload attached to a [`ProgressEvent`].
pub type EventContext = BTreeMap<String, serde_json::Value>;

/// Context key carrying the quest number on `quest_completion` events.
pub const QUEST_NUMBER_KEY: &str = "quest_number";

/// A user action submitted to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event_type: EventType,
    #[serde(default)]
    pub context: EventContext,
    /// XP granted directly by the action itself, before any achievement.
    #[serde(default)]
    pub xp: Option<u32>,
    /// Identifies the rewarded object (hackathon id, guild id, ...).
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ProgressEvent {
    pub fn new(event_type: impl Into<EventType>) -> Self {
        Self {
            event_type: event_type.into(),
            context: EventContext::new(),
            xp: None,
            reference_id: None,
            description: None,
        }
    }

    pub fn quest_completion(quest_number: u8, xp: u32) -> Self {
        Self::new(EventType::QUEST_COMPLETION)
            .with(QUEST_NUMBER_KEY, quest_number)
            .with_xp(xp)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_xp(mut self, xp: u32) -> Self {
        self.xp = Some(xp);
        self
    }

    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Quest number carried in the context, if it is a valid `u8`.
    pub fn quest_number(&self) -> Option<u8> {
        self.context
            .get(QUEST_NUMBER_KEY)
            .and_then(|v| v.as_u64())
            .and_then(|n| u8::try_from(n).ok())
    }
}

/// Every visible state change produces an Event.
/// The UI drains these after each step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    QuestStarted {
        quest_number: u8,
        at: DateTime<Utc>,
    },
    QuestCompleted {
        quest_number: u8,
        xp_awarded: u32,
        next_unlocked: Option<u8>,
        at: DateTime<Utc>,
    },
    /// The final quest was completed; there is no next quest.
    JourneyComplete {
        at: DateTime<Utc>,
    },
    XpAwarded {
        amount: u32,
        source: EventType,
        reference_id: Option<String>,
        total_xp: u64,
        at: DateTime<Utc>,
    },
    LevelUp {
        from_level: u32,
        to_level: u32,
        total_xp: u64,
        at: DateTime<Utc>,
    },
    AchievementUnlocked {
        achievement_id: String,
        name: String,
        category: AchievementCategory,
        rarity: Rarity,
        xp_awarded: u32,
        at: DateTime<Utc>,
    },
}
