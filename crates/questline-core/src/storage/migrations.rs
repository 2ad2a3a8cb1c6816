//! Database schema migrations for questline.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: quests, XP ledger, achievement counters and unlocks.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS quests (
            user_id      TEXT NOT NULL,
            quest_number INTEGER NOT NULL,
            started_at   TEXT,
            completed_at TEXT,
            xp_awarded   INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, quest_number)
        );

        CREATE TABLE IF NOT EXISTS xp_entries (
            id           TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL,
            amount       INTEGER NOT NULL CHECK (amount > 0),
            source       TEXT NOT NULL,
            reference_id TEXT,
            description  TEXT NOT NULL DEFAULT '',
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS achievement_progress (
            user_id        TEXT NOT NULL,
            achievement_id TEXT NOT NULL,
            value          INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, achievement_id)
        );

        CREATE TABLE IF NOT EXISTS achievement_unlocks (
            user_id        TEXT NOT NULL,
            achievement_id TEXT NOT NULL,
            xp_awarded     INTEGER NOT NULL,
            unlocked_at    TEXT NOT NULL,
            PRIMARY KEY (user_id, achievement_id)
        );

        CREATE INDEX IF NOT EXISTS idx_xp_entries_user ON xp_entries(user_id, created_at);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: reference lookups and counter timestamps.
///
/// - Index on (user_id, reference_id) for replay detection
/// - `updated_at` on achievement_progress
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_xp_entries_reference ON xp_entries(user_id, reference_id);
         ALTER TABLE achievement_progress ADD COLUMN updated_at TEXT NOT NULL DEFAULT '';",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

/// Migration v3: processed event references.
///
/// Backfills from XP entries that carry a reference, skipping quest
/// rewards and achievement rewards.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS processed_events (
            user_id      TEXT NOT NULL,
            event_type   TEXT NOT NULL,
            reference_id TEXT NOT NULL,
            processed_at TEXT NOT NULL,
            PRIMARY KEY (user_id, event_type, reference_id)
        );

        INSERT OR IGNORE INTO processed_events (user_id, event_type, reference_id, processed_at)
        SELECT x.user_id, x.source, x.reference_id, MIN(x.created_at)
        FROM xp_entries x
        WHERE x.reference_id IS NOT NULL
          AND x.source <> 'quest_completion'
          AND NOT EXISTS (
              SELECT 1 FROM achievement_unlocks u
              WHERE u.user_id = x.user_id AND u.achievement_id = x.reference_id
          )
        GROUP BY x.user_id, x.source, x.reference_id;",
    )?;
    set_schema_version(&tx, 3)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn v2_adds_updated_at_column() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO achievement_progress (user_id, achievement_id, value, updated_at)
             VALUES ('u', 'a', 1, '2026-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn v3_backfills_referenced_events() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        migrate_v2(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO xp_entries (id, user_id, amount, source, reference_id, created_at) VALUES
                ('a', 'u', 20, 'hackathon_join', 'hack-1', '2026-01-01T00:00:00+00:00'),
                ('b', 'u', 50, 'hackathon_join', 'first_hackathon', '2026-01-01T00:00:00+00:00'),
                ('c', 'u', 100, 'quest_completion', '1', '2026-01-01T00:00:00+00:00'),
                ('d', 'u', 10, 'manual', NULL, '2026-01-01T00:00:00+00:00');
             INSERT INTO achievement_unlocks (user_id, achievement_id, xp_awarded, unlocked_at)
             VALUES ('u', 'first_hackathon', 50, '2026-01-01T00:00:00+00:00');",
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 3);
        let refs: Vec<String> = conn
            .prepare("SELECT reference_id FROM processed_events ORDER BY reference_id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(refs, ["hack-1"]);
    }
}
