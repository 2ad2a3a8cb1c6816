//! Onboarding quest progression.

pub mod machine;

pub use machine::{Quest, QuestLog, QuestRecord, QuestStatus, QuestTransition, RejectReason, QUEST_COUNT};
