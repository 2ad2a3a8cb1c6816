//! Unlock conditions.
//!
//! Conditions are data, interpreted by [`Condition::evaluate`] against the
//! incoming event context and the definition's progress counter.

use serde::{Deserialize, Serialize};

use crate::events::EventContext;

/// A predicate over event context and progress counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Progress counter has reached `threshold`.
    CounterAtLeast { threshold: u64 },

    /// Event context field equals `value` exactly.
    ContextEquals {
        field: String,
        value: serde_json::Value,
    },

    /// Every nested condition holds.
    All { conditions: Vec<Condition> },
}

impl Condition {
    pub fn counter_at_least(threshold: u64) -> Self {
        Condition::CounterAtLeast { threshold }
    }

    pub fn context_equals(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Condition::ContextEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::All { conditions }
    }

    pub fn evaluate(&self, context: &EventContext, counter: u64) -> bool {
        match self {
            Condition::CounterAtLeast { threshold } => counter >= *threshold,
            Condition::ContextEquals { field, value } => context.get(field) == Some(value),
            Condition::All { conditions } => conditions.iter().all(|c| c.evaluate(context, counter)),
        }
    }

    /// Whether this condition reads the progress counter anywhere.
    pub fn uses_counter(&self) -> bool {
        match self {
            Condition::CounterAtLeast { .. } => true,
            Condition::ContextEquals { .. } => false,
            Condition::All { conditions } => conditions.iter().any(Condition::uses_counter),
        }
    }

    /// Structural check. Returns a human-readable problem if malformed.
    pub fn problem(&self) -> Option<String> {
        match self {
            Condition::CounterAtLeast { threshold: 0 } => {
                Some("counter_at_least threshold must be at least 1".to_string())
            }
            Condition::CounterAtLeast { .. } => None,
            Condition::ContextEquals { field, .. } if field.trim().is_empty() => {
                Some("context_equals field must not be empty".to_string())
            }
            Condition::ContextEquals { value, .. } if value.is_null() => {
                Some("context_equals value must not be null".to_string())
            }
            Condition::ContextEquals { .. } => None,
            Condition::All { conditions } if conditions.is_empty() => {
                Some("all must contain at least one condition".to_string())
            }
            Condition::All { conditions } => conditions.iter().find_map(Condition::problem),
        }
    }
}
