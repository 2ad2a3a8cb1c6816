//! Restart behaviour: on-disk store plus on-disk outbox.
//!
//! Progress made while the store is unreachable must survive a restart
//! through the outbox, and reach the store once it comes back.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use questline_core::error::Result;
use questline_core::xp::XpEntry;
use questline_core::{
    AchievementEngine, AchievementRegistry, CoreError, Database, EventType, Outbox, ProgressEvent,
    ProgressStore, ProgressionEngine, QuestStatus, QuestTransition, RetryPolicy, StoredProgression,
};
use tempfile::TempDir;

/// SQLite store whose saves can be switched off, or made to fail a few times.
struct SwitchableStore {
    db: Database,
    online: Cell<bool>,
    failures: Cell<u32>,
}

impl SwitchableStore {
    fn open(path: &Path, online: bool) -> Self {
        Self {
            db: Database::open_at(path).unwrap(),
            online: Cell::new(online),
            failures: Cell::new(0),
        }
    }

    fn failing(path: &Path, failures: u32) -> Self {
        let store = Self::open(path, true);
        store.failures.set(failures);
        store
    }

    fn gate(&self) -> Result<()> {
        if !self.online.get() {
            return Err(CoreError::Custom("store unreachable".into()));
        }
        let left = self.failures.get();
        if left > 0 {
            self.failures.set(left - 1);
            return Err(CoreError::Custom("store hiccup".into()));
        }
        Ok(())
    }
}

impl ProgressStore for SwitchableStore {
    fn load_progression_state(&self, user_id: &str) -> Result<StoredProgression> {
        self.db.load_progression_state(user_id)
    }
    fn save_quest_start(&self, user_id: &str, n: u8, at: DateTime<Utc>) -> Result<()> {
        self.gate()?;
        self.db.save_quest_start(user_id, n, at)
    }
    fn save_quest_completion(&self, user_id: &str, n: u8, xp: u32, at: DateTime<Utc>) -> Result<()> {
        self.gate()?;
        self.db.save_quest_completion(user_id, n, xp, at)
    }
    fn save_xp_entry(&self, user_id: &str, entry: &XpEntry) -> Result<()> {
        self.gate()?;
        self.db.save_xp_entry(user_id, entry)
    }
    fn save_achievement_progress(&self, user_id: &str, id: &str, value: u64) -> Result<()> {
        self.gate()?;
        self.db.save_achievement_progress(user_id, id, value)
    }
    fn save_achievement_unlock(&self, user_id: &str, id: &str, xp: u32, at: DateTime<Utc>) -> Result<()> {
        self.gate()?;
        self.db.save_achievement_unlock(user_id, id, xp, at)
    }
    fn save_processed_event(&self, user_id: &str, ty: &EventType, reference: &str, at: DateTime<Utc>) -> Result<()> {
        self.gate()?;
        self.db.save_processed_event(user_id, ty, reference, at)
    }
}

struct Paths {
    _dir: TempDir,
    db: PathBuf,
    outbox: PathBuf,
}

fn paths() -> Paths {
    let dir = TempDir::new().unwrap();
    Paths {
        db: dir.path().join("questline.db"),
        outbox: dir.path().join("outbox.json"),
        _dir: dir,
    }
}

/// Retries are due immediately so a reopen can deliver them.
fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 20,
        base_backoff: Duration::zero(),
        ..RetryPolicy::default()
    }
}

fn open(paths: &Paths, online: bool) -> ProgressionEngine<SwitchableStore> {
    open_with(paths, SwitchableStore::open(&paths.db, online), policy())
}

fn open_with(
    paths: &Paths,
    store: SwitchableStore,
    policy: RetryPolicy,
) -> ProgressionEngine<SwitchableStore> {
    ProgressionEngine::open(
        "u1",
        store,
        AchievementEngine::new(AchievementRegistry::builtin()),
        Outbox::open_at(paths.outbox.clone(), policy).unwrap(),
    )
    .unwrap()
}

/// One attempt per write, retries due immediately.
fn strict_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        base_backoff: Duration::zero(),
        ..RetryPolicy::default()
    }
}

#[test]
fn progress_survives_restart_via_store() {
    let paths = paths();
    {
        let mut engine = open(&paths, true);
        engine.complete_quest(1, 100);
        engine.complete_quest(2, 100);
        let report = engine.flush_outbox();
        assert_eq!(report.remaining, 0);
    }

    let engine = open(&paths, true);
    assert_eq!(engine.quest_status(2), Some(QuestStatus::Completed));
    assert_eq!(engine.quest_status(3), Some(QuestStatus::Available));
    assert!(engine.state().achievements.is_unlocked("first_steps"));
    assert_eq!(engine.state().achievements.counter("halfway_there"), 2);
    // 2 quests + first_steps.
    assert_eq!(engine.total_xp(), 250);
    assert_eq!(engine.pending_writes(), 0);
}

#[test]
fn offline_progress_survives_restart_via_outbox() {
    let paths = paths();
    let total = {
        let mut engine = open(&paths, false);
        engine.complete_quest(1, 100);
        let report = engine.flush_outbox();
        assert_eq!(report.delivered, 0);
        assert!(report.failed > 0);
        engine.total_xp()
    };

    // Still offline: state comes back from the queued writes alone.
    {
        let engine = open(&paths, false);
        assert_eq!(engine.quest_status(1), Some(QuestStatus::Completed));
        assert_eq!(engine.total_xp(), total);
        assert!(engine.pending_writes() > 0);
        let db = Database::open_at(&paths.db).unwrap();
        assert_eq!(db.total_xp("u1").unwrap(), 0);
    }

    // Back online: open delivers the backlog before loading.
    let engine = open(&paths, true);
    assert_eq!(engine.pending_writes(), 0);
    assert_eq!(engine.total_xp(), total);
    assert_eq!(engine.store().db.total_xp("u1").unwrap(), total);
}

#[test]
fn replayed_writes_do_not_double_count() {
    let paths = paths();
    {
        let mut engine = open(&paths, true);
        engine.complete_quest(1, 100);
        engine.flush_outbox();
    }

    // Completing again after a restart grants nothing.
    for _ in 0..2 {
        let mut engine = open(&paths, true);
        engine.complete_quest(1, 100);
        engine.flush_outbox();
    }

    let engine = open(&paths, true);
    assert_eq!(engine.total_xp(), 150);
    assert_eq!(engine.store().db.count_reference("u1", "1").unwrap(), 1);
    assert_eq!(engine.store().db.count_reference("u1", "first_steps").unwrap(), 1);
}

#[test]
fn dead_letters_are_kept_and_can_be_retried() {
    let paths = paths();
    let mut engine = open_with(&paths, SwitchableStore::open(&paths.db, false), strict_policy());
    engine.award_xp(10, EventType::MANUAL, None, None);

    let report = engine.flush_outbox();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(engine.outbox().dead_letters().len(), 1);
    assert_eq!(engine.pending_writes(), 0);

    engine.store().online.set(true);
    assert_eq!(engine.retry_dead_letters(), 1);
    assert_eq!(engine.flush_outbox().delivered, 1);
    assert_eq!(engine.store().db.total_xp("u1").unwrap(), 10);
}

#[test]
fn dead_lettered_completion_survives_restart() {
    let paths = paths();
    {
        let mut engine = open_with(&paths, SwitchableStore::open(&paths.db, true), strict_policy());
        engine.complete_quest(1, 100);
        assert_eq!(engine.total_xp(), 150);
    }

    // The quest row dies on the first attempt; the XP rows behind it land.
    {
        let engine = open_with(&paths, SwitchableStore::failing(&paths.db, 1), strict_policy());
        assert_eq!(engine.outbox().dead_letters().len(), 1);
        assert_eq!(engine.pending_writes(), 0);
        assert_eq!(engine.quest_status(1), Some(QuestStatus::Completed));
        let stored = engine.store().db.load_progression_state("u1").unwrap();
        assert!(stored.quests.is_empty());
        assert_eq!(engine.store().db.total_xp("u1").unwrap(), 150);
    }

    let mut engine = open_with(&paths, SwitchableStore::open(&paths.db, true), strict_policy());
    assert_eq!(engine.quest_status(1), Some(QuestStatus::Completed));
    assert_eq!(engine.quest_status(2), Some(QuestStatus::Available));
    assert_eq!(engine.total_xp(), 150);

    let report = engine.complete_quest(1, 100);
    assert_eq!(report.quest, Some(QuestTransition::AlreadyCompleted { number: 1 }));
    engine.flush_outbox();
    assert_eq!(engine.total_xp(), 150);
    assert_eq!(engine.state().ledger.entries_for_reference("1").count(), 1);
    assert_eq!(engine.store().db.count_reference("u1", "1").unwrap(), 1);

    assert_eq!(engine.retry_dead_letters(), 1);
    assert_eq!(engine.flush_outbox().delivered, 1);
    assert_eq!(engine.store().db.load_progression_state("u1").unwrap().quests.len(), 1);
}

#[test]
fn referenced_event_without_xp_counts_once_across_restarts() {
    let paths = paths();
    let join = ProgressEvent::new(EventType::HACKATHON_JOIN).with_reference("hack-1");
    {
        let mut engine = open(&paths, true);
        assert!(!engine.record(join.clone()).replay);
        engine.flush_outbox();
    }

    for _ in 0..2 {
        let mut engine = open(&paths, true);
        assert!(engine.record(join.clone()).replay);
        engine.flush_outbox();
    }

    let engine = open(&paths, true);
    assert_eq!(engine.state().achievements.counter("hackathon_regular"), 1);
    assert!(!engine.state().achievements.is_unlocked("hackathon_regular"));
}
