//! SQLite-based progression storage.
//!
//! Provides persistent storage for:
//! - Quest start/completion rows
//! - XP ledger entries
//! - Achievement counters and unlocks

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::data_dir;
use super::migrations;
use super::store::{ProcessedEvent, ProgressRecord, ProgressStore, StoredProgression};
use crate::achievements::AchievementUnlock;
use crate::error::{DatabaseError, Result};
use crate::events::EventType;
use crate::quest::QuestRecord;
use crate::xp::XpEntry;

/// SQLite database holding every user's progression.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data dir>/questline.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("questline.db");
        Self::open_at(&path)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and ephemeral sessions).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    fn load_quests(&self, user_id: &str) -> Result<Vec<QuestRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT quest_number, started_at, completed_at, xp_awarded
             FROM quests WHERE user_id = ?1 ORDER BY quest_number",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, u8>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, u32>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (quest_number, started_at, completed_at, xp_awarded) = row?;
            records.push(QuestRecord {
                quest_number,
                started_at: parse_optional_ts("quests", started_at)?,
                completed_at: parse_optional_ts("quests", completed_at)?,
                xp_awarded,
            });
        }
        Ok(records)
    }

    fn load_xp_entries(&self, user_id: &str) -> Result<Vec<XpEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, amount, source, reference_id, description, created_at
             FROM xp_entries WHERE user_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, amount, source, reference_id, description, created_at) = row?;
            entries.push(XpEntry {
                id,
                amount,
                source: EventType::new(source),
                reference_id,
                description,
                timestamp: parse_ts("xp_entries", &created_at)?,
            });
        }
        Ok(entries)
    }

    fn load_progress(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT achievement_id, value FROM achievement_progress
             WHERE user_id = ?1 ORDER BY achievement_id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ProgressRecord {
                achievement_id: row.get(0)?,
                value: row.get::<_, i64>(1)?.max(0) as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn load_unlocks(&self, user_id: &str) -> Result<Vec<AchievementUnlock>> {
        let mut stmt = self.conn.prepare(
            "SELECT achievement_id, xp_awarded, unlocked_at FROM achievement_unlocks
             WHERE user_id = ?1 ORDER BY unlocked_at",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut unlocks = Vec::new();
        for row in rows {
            let (achievement_id, xp_awarded, unlocked_at) = row?;
            unlocks.push(AchievementUnlock {
                achievement_id,
                xp_awarded,
                unlocked_at: parse_ts("achievement_unlocks", &unlocked_at)?,
            });
        }
        Ok(unlocks)
    }

    fn load_processed(&self, user_id: &str) -> Result<Vec<ProcessedEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_type, reference_id, processed_at FROM processed_events
             WHERE user_id = ?1 ORDER BY processed_at",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut processed = Vec::new();
        for row in rows {
            let (event_type, reference_id, processed_at) = row?;
            processed.push(ProcessedEvent {
                event_type: EventType::new(event_type),
                reference_id,
                processed_at: parse_ts("processed_events", &processed_at)?,
            });
        }
        Ok(processed)
    }

    /// Number of XP entries stored for a user rewarding `reference_id`.
    pub fn count_reference(&self, user_id: &str, reference_id: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM xp_entries WHERE user_id = ?1 AND reference_id = ?2",
            params![user_id, reference_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Stored total for a user, straight from SQL.
    pub fn total_xp(&self, user_id: &str) -> Result<u64> {
        let total: Option<i64> = self
            .conn
            .query_row(
                "SELECT SUM(amount) FROM xp_entries WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(total.unwrap_or(0).max(0) as u64)
    }
}

impl ProgressStore for Database {
    fn load_progression_state(&self, user_id: &str) -> Result<StoredProgression> {
        Ok(StoredProgression {
            quests: self.load_quests(user_id)?,
            xp_entries: self.load_xp_entries(user_id)?,
            achievement_progress: self.load_progress(user_id)?,
            achievement_unlocks: self.load_unlocks(user_id)?,
            processed_events: self.load_processed(user_id)?,
        })
    }

    fn save_quest_start(&self, user_id: &str, quest_number: u8, started_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO quests (user_id, quest_number, started_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, quest_number)
             DO UPDATE SET started_at = COALESCE(quests.started_at, excluded.started_at)",
            params![user_id, quest_number, started_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn save_quest_completion(
        &self,
        user_id: &str,
        quest_number: u8,
        xp_awarded: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let ts = completed_at.to_rfc3339();
        self.conn.execute(
            "INSERT INTO quests (user_id, quest_number, started_at, completed_at, xp_awarded)
             VALUES (?1, ?2, ?3, ?3, ?4)
             ON CONFLICT(user_id, quest_number)
             DO UPDATE SET
                started_at = COALESCE(quests.started_at, excluded.started_at),
                completed_at = COALESCE(quests.completed_at, excluded.completed_at),
                xp_awarded = CASE WHEN quests.completed_at IS NULL
                                  THEN excluded.xp_awarded ELSE quests.xp_awarded END",
            params![user_id, quest_number, ts, xp_awarded],
        )?;
        Ok(())
    }

    fn save_xp_entry(&self, user_id: &str, entry: &XpEntry) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO xp_entries
                (id, user_id, amount, source, reference_id, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                user_id,
                entry.amount,
                entry.source.as_str(),
                entry.reference_id,
                entry.description,
                entry.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn save_achievement_progress(&self, user_id: &str, achievement_id: &str, value: u64) -> Result<()> {
        let value = i64::try_from(value).unwrap_or(i64::MAX);
        self.conn.execute(
            "INSERT INTO achievement_progress (user_id, achievement_id, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, achievement_id)
             DO UPDATE SET value = MAX(achievement_progress.value, excluded.value),
                           updated_at = excluded.updated_at",
            params![user_id, achievement_id, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn save_achievement_unlock(
        &self,
        user_id: &str,
        achievement_id: &str,
        xp_awarded: u32,
        unlocked_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO achievement_unlocks (user_id, achievement_id, xp_awarded, unlocked_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, achievement_id, xp_awarded, unlocked_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn save_processed_event(
        &self,
        user_id: &str,
        event_type: &EventType,
        reference_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO processed_events (user_id, event_type, reference_id, processed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, event_type.as_str(), reference_id, processed_at.to_rfc3339()],
        )?;
        Ok(())
    }
}

fn parse_ts(table: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            DatabaseError::CorruptRow {
                table,
                message: format!("bad timestamp '{raw}': {e}"),
            }
            .into()
        })
}

fn parse_optional_ts(table: &'static str, raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(table, &s)).transpose()
}
