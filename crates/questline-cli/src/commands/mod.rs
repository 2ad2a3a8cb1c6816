pub mod achievements;
pub mod config;
pub mod event;
pub mod quest;
pub mod sync;
pub mod xp;

use questline_core::events::EventContext;
use questline_core::{Config, Database, ProgressionEngine, ValidationError};
use serde::Serialize;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Open the engine for the configured user.
pub fn open_engine() -> Result<ProgressionEngine<Database>, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    Ok(ProgressionEngine::open_local(&config)?)
}

/// Push queued writes to the store before exiting. Failures stay queued.
pub fn finish(engine: &mut ProgressionEngine<Database>) {
    let report = engine.flush_outbox();
    if report.failed > 0 {
        tracing::warn!(remaining = report.remaining, "writes left in outbox");
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse `key=value` pairs. Values that are valid JSON (numbers, booleans)
/// keep their type; anything else is a string.
pub fn parse_context(pairs: &[String]) -> Result<EventContext, ValidationError> {
    let invalid = |message: String| ValidationError::InvalidValue {
        field: "context".into(),
        message,
    };
    let mut context = EventContext::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| invalid(format!("expected key=value, got '{pair}'")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid(format!("empty key in '{pair}'")));
        }
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        context.insert(key.to_string(), value);
    }
    Ok(context)
}
