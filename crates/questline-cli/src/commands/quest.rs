use clap::Subcommand;
use questline_core::{ValidationError, QUEST_COUNT};
use serde_json::json;

use super::{finish, open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum QuestAction {
    /// Show quest statuses as JSON
    Status {
        /// Quest number (1-8); all quests when omitted
        number: Option<u8>,
    },
    /// Mark an available quest as begun
    Start {
        /// Quest number
        number: u8,
    },
    /// Complete a quest and grant its XP
    Complete {
        /// Quest number
        number: u8,
        /// XP granted on first completion
        #[arg(long, default_value = "100")]
        xp: u32,
    },
}

pub fn run(action: QuestAction) -> CommandResult {
    let mut engine = open_engine()?;
    match action {
        QuestAction::Status { number: Some(number) } => {
            let quest = engine
                .state()
                .quests
                .quest(number)
                .ok_or(ValidationError::UnknownQuest {
                    number,
                    count: QUEST_COUNT,
                })?;
            print_json(quest)?;
        }
        QuestAction::Status { number: None } => {
            let quests = &engine.state().quests;
            print_json(&json!({
                "current_quest": engine.current_quest_number(),
                "completed": quests.completed_count(),
                "journey_complete": quests.is_journey_complete(),
                "quests": quests.quests(),
            }))?;
        }
        QuestAction::Start { number } => {
            let started = engine.start_quest(number);
            print_json(&json!({
                "quest": number,
                "started": started,
                "status": engine.quest_status(number),
            }))?;
            finish(&mut engine);
        }
        QuestAction::Complete { number, xp } => {
            let report = engine.complete_quest(number, xp);
            let events = engine.drain_events();
            print_json(&json!({ "report": report, "events": events }))?;
            finish(&mut engine);
        }
    }
    Ok(())
}
