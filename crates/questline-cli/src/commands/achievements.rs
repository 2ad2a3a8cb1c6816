use clap::Subcommand;
use questline_core::EventType;
use serde_json::json;

use super::{finish, open_engine, parse_context, print_json, CommandResult};

#[derive(Subcommand)]
pub enum AchievementsAction {
    /// List achievement definitions with unlock state
    List {
        /// Only show unlocked achievements
        #[arg(long)]
        unlocked: bool,
    },
    /// Show progress counters
    Progress,
    /// Evaluate achievements for an event type without counting it
    Check {
        /// Event type tag
        event_type: String,
        /// Context fields as key=value
        #[arg(long = "context", short = 'c')]
        context: Vec<String>,
    },
    /// Show registry issues (malformed or duplicate definitions)
    Issues,
}

pub fn run(action: AchievementsAction) -> CommandResult {
    let mut engine = open_engine()?;
    match action {
        AchievementsAction::List { unlocked } => {
            let tracker = &engine.state().achievements;
            let rows: Vec<_> = engine
                .registry()
                .definitions()
                .iter()
                .filter(|d| !unlocked || tracker.is_unlocked(&d.id))
                .map(|d| {
                    json!({
                        "id": d.id,
                        "name": d.name,
                        "description": d.description,
                        "category": d.category,
                        "rarity": d.rarity,
                        "xp_reward": d.xp_reward,
                        "unlocked": tracker.is_unlocked(&d.id),
                        "unlocked_at": tracker.unlock_record(&d.id).map(|u| u.unlocked_at),
                    })
                })
                .collect();
            print_json(&rows)?;
        }
        AchievementsAction::Progress => {
            let tracker = &engine.state().achievements;
            let rows: Vec<_> = engine
                .registry()
                .definitions()
                .iter()
                .filter(|d| d.is_counter_based())
                .map(|d| {
                    json!({
                        "id": d.id,
                        "value": tracker.counter(&d.id),
                        "unlocked": tracker.is_unlocked(&d.id),
                    })
                })
                .collect();
            print_json(&rows)?;
        }
        AchievementsAction::Check {
            event_type,
            context,
        } => {
            let context = parse_context(&context)?;
            let unlocked = engine.check_achievements(&EventType::new(event_type), &context);
            let events = engine.drain_events();
            print_json(&json!({ "unlocked": unlocked, "events": events }))?;
            finish(&mut engine);
        }
        AchievementsAction::Issues => {
            let issues: Vec<String> = engine.registry().issues().iter().map(|e| e.to_string()).collect();
            print_json(&issues)?;
        }
    }
    Ok(())
}
