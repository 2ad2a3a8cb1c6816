//! # Questline Core Library
//!
//! Progression engine for the Questline onboarding journey: an ordered
//! chain of quests, an XP ledger with derived levels, and a data-driven
//! achievement rule engine. The CLI binary is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Quests**: eight quests unlocked one after another; completion is
//!   idempotent and out-of-order completion is rejected
//! - **XP**: append-only ledger; total and level are always derived
//! - **Achievements**: registry of tagged conditions evaluated against
//!   events and per-achievement counters, unlocking each at most once
//! - **Storage**: SQLite progress store and TOML configuration
//! - **Sync**: durable outbox delivering writes to the store with retry
//!
//! ## Key Components
//!
//! - [`ProgressionEngine`]: session-scoped service and the only mutator
//! - [`ProgressionState`]: the state it owns
//! - [`Database`]: SQLite [`ProgressStore`]
//! - [`Outbox`]: pending store writes
//! - [`Config`]: application configuration

pub mod achievements;
pub mod engine;
pub mod error;
pub mod events;
pub mod quest;
pub mod state;
pub mod storage;
pub mod sync;
pub mod xp;

pub use achievements::{
    AchievementCategory, AchievementDefinition, AchievementEngine, AchievementRegistry, Condition,
    Rarity, UnlockedAchievement,
};
pub use engine::{ProgressionEngine, StepReport};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::{Event, EventContext, EventType, ProgressEvent};
pub use quest::{QuestStatus, QuestTransition, QUEST_COUNT};
pub use state::ProgressionState;
pub use storage::{Config, Database, ProgressStore, StoredProgression};
pub use sync::{FlushReport, Outbox, OutboxWrite, RetryPolicy};
pub use xp::{LevelProgress, XpEntry, XpLedger};
