//! Append-only XP ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::level::{level_for_xp, LevelProgress};
use crate::events::EventType;

/// One immutable XP grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpEntry {
    pub id: String,
    pub amount: u32,
    pub source: EventType,
    /// Quest number, achievement id, hackathon id, ...
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of an `award` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpAward {
    /// `None` when the amount was zero and nothing was appended.
    pub entry: Option<XpEntry>,
    pub total_xp: u64,
    pub previous_level: u32,
    pub level: u32,
}

impl XpAward {
    pub fn leveled_up(&self) -> bool {
        self.level > self.previous_level
    }
}

/// Ledger of XP entries. Totals are summed, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpLedger {
    entries: Vec<XpEntry>,
}

impl XpLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored entries, ordered by timestamp.
    pub fn from_entries(mut entries: Vec<XpEntry>) -> Self {
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        entries.dedup_by(|a, b| a.id == b.id);
        Self { entries }
    }

    /// Append an entry unconditionally. Callers own de-duplication.
    /// Zero amounts are dropped since entries must carry positive XP.
    pub fn award(
        &mut self,
        amount: u32,
        source: EventType,
        reference_id: Option<String>,
        description: Option<String>,
        at: DateTime<Utc>,
    ) -> XpAward {
        let previous_level = self.level();
        if amount == 0 {
            return XpAward {
                entry: None,
                total_xp: self.total_xp(),
                previous_level,
                level: previous_level,
            };
        }

        let description = description.unwrap_or_else(|| default_description(&source, amount));
        let entry = XpEntry {
            id: Uuid::new_v4().to_string(),
            amount,
            source,
            reference_id,
            description,
            timestamp: at,
        };
        self.entries.push(entry.clone());

        XpAward {
            entry: Some(entry),
            total_xp: self.total_xp(),
            previous_level,
            level: self.level(),
        }
    }

    /// Re-insert an entry that already has an id (outbox replay).
    /// Returns false if the id is already present.
    pub fn restore(&mut self, entry: XpEntry) -> bool {
        if self.entries.iter().any(|e| e.id == entry.id) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn total_xp(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.amount)).sum()
    }

    pub fn level(&self) -> u32 {
        level_for_xp(self.total_xp())
    }

    pub fn level_progress(&self) -> LevelProgress {
        LevelProgress::for_xp(self.total_xp())
    }

    pub fn entries(&self) -> &[XpEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries rewarding `reference_id`, from any source.
    pub fn entries_for_reference<'a>(
        &'a self,
        reference_id: &'a str,
    ) -> impl Iterator<Item = &'a XpEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.reference_id.as_deref() == Some(reference_id))
    }
}

fn default_description(source: &EventType, amount: u32) -> String {
    format!("+{amount} XP ({source})")
}
