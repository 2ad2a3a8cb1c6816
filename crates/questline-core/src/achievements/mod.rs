//! Achievement rule engine.
//!
//! A fixed registry of definitions, per-user progress counters, and an
//! evaluator that unlocks each definition at most once.

pub mod condition;
pub mod definition;
pub mod engine;
pub mod error;
pub mod registry;
pub mod tracker;

pub use condition::Condition;
pub use definition::{AchievementCategory, AchievementDefinition, Rarity};
pub use engine::{AchievementEngine, ProgressChange, UnlockedAchievement};
pub use error::{AchievementError, Result};
pub use registry::AchievementRegistry;
pub use tracker::{AchievementTracker, AchievementUnlock};
