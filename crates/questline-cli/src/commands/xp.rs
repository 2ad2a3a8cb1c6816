use clap::Subcommand;
use questline_core::{EventType, ValidationError};
use serde_json::json;

use super::{finish, open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum XpAction {
    /// Show total XP and level progress
    Show,
    /// Grant XP directly
    Award {
        /// Amount of XP
        amount: u32,
        /// Source tag recorded on the entry
        #[arg(long, default_value = "manual")]
        source: String,
        /// Rewarded object id
        #[arg(long)]
        reference: Option<String>,
        /// Display text
        #[arg(long)]
        description: Option<String>,
    },
    /// List ledger entries, newest first
    History {
        /// Maximum number of entries
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: XpAction) -> CommandResult {
    let mut engine = open_engine()?;
    match action {
        XpAction::Show => {
            print_json(&engine.level_progress())?;
        }
        XpAction::Award {
            amount,
            source,
            reference,
            description,
        } => {
            let source = EventType::new(source);
            if source.is_blank() {
                return Err(ValidationError::Empty("source".into()).into());
            }
            let award = engine.award_xp(amount, source, reference, description);
            let events = engine.drain_events();
            print_json(&json!({
                "entry": award.entry,
                "total_xp": award.total_xp,
                "previous_level": award.previous_level,
                "level": award.level,
                "events": events,
            }))?;
            finish(&mut engine);
        }
        XpAction::History { limit } => {
            let entries: Vec<_> = engine.state().ledger.entries().iter().rev().take(limit).collect();
            print_json(&entries)?;
        }
    }
    Ok(())
}
