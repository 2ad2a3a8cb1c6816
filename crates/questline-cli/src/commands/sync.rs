//! Outbox inspection and delivery.

use clap::Subcommand;
use serde_json::json;

use super::{open_engine, print_json, CommandResult};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Show queued and dead-lettered writes
    Status {
        /// Include the queued writes themselves
        #[arg(long)]
        all: bool,
    },
    /// Deliver due writes to the store now
    Flush,
    /// Requeue dead-lettered writes and flush
    Retry,
}

pub fn run(action: SyncAction) -> CommandResult {
    let mut engine = open_engine()?;
    match action {
        SyncAction::Status { all } => {
            let outbox = engine.outbox();
            let mut status = json!({
                "user_id": engine.user_id(),
                "pending": engine.pending_writes(),
                "dead_letters": outbox.dead_letters().len(),
                "next_attempt_in_secs": outbox
                    .time_until_next(chrono::Utc::now())
                    .map(|d| d.num_seconds()),
            });
            if all {
                status["queued"] = json!(outbox.pending().collect::<Vec<_>>());
                status["dead"] = json!(outbox.dead_letters());
            }
            print_json(&status)?;
        }
        SyncAction::Flush => {
            let report = engine.flush_outbox();
            print_json(&report)?;
        }
        SyncAction::Retry => {
            let requeued = engine.retry_dead_letters();
            let report = engine.flush_outbox();
            print_json(&json!({ "requeued": requeued, "flush": report }))?;
        }
    }
    Ok(())
}
