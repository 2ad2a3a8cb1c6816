use clap::Args;
use questline_core::ProgressEvent;
use serde_json::json;

use super::{finish, open_engine, parse_context, print_json, CommandResult};

/// Submit one progress event.
#[derive(Args)]
pub struct EventArgs {
    /// Event type tag (e.g. hackathon_join, quest_completion)
    pub event_type: String,
    /// XP granted by the action itself
    #[arg(long)]
    pub xp: Option<u32>,
    /// Rewarded object id; repeats of the same id are ignored
    #[arg(long)]
    pub reference: Option<String>,
    /// Display text for the XP entry
    #[arg(long)]
    pub description: Option<String>,
    /// Context fields as key=value
    #[arg(long = "context", short = 'c')]
    pub context: Vec<String>,
}

pub fn run(args: EventArgs) -> CommandResult {
    let mut event = ProgressEvent::new(args.event_type);
    event.context = parse_context(&args.context)?;
    event.xp = args.xp;
    event.reference_id = args.reference;
    event.description = args.description;

    let mut engine = open_engine()?;
    let report = engine.record(event);
    let events = engine.drain_events();
    print_json(&json!({ "report": report, "events": events }))?;
    finish(&mut engine);
    Ok(())
}
