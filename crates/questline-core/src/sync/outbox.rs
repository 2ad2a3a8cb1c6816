//! Durable outbox of pending store writes.
//!
//! The engine never writes to the store directly. Each step enqueues its
//! writes here, and `flush` delivers them in order with bounded retry.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::events::EventType;
use crate::storage::{data_dir, ProgressStore};
use crate::xp::XpEntry;

/// A single write destined for the [`ProgressStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboxWrite {
    QuestStarted {
        quest_number: u8,
        started_at: DateTime<Utc>,
    },
    QuestCompleted {
        quest_number: u8,
        xp_awarded: u32,
        completed_at: DateTime<Utc>,
    },
    XpEntry {
        entry: XpEntry,
    },
    AchievementProgress {
        achievement_id: String,
        value: u64,
    },
    AchievementUnlocked {
        achievement_id: String,
        xp_awarded: u32,
        unlocked_at: DateTime<Utc>,
    },
    EventProcessed {
        event_type: EventType,
        reference_id: String,
        processed_at: DateTime<Utc>,
    },
}

impl OutboxWrite {
    /// Writes sharing a key supersede each other while still queued.
    fn coalesce_key(&self) -> Option<&str> {
        match self {
            OutboxWrite::AchievementProgress { achievement_id, .. } => Some(achievement_id.as_str()),
            _ => None,
        }
    }

    fn deliver<S: ProgressStore + ?Sized>(&self, store: &S, user_id: &str) -> Result<()> {
        match self {
            OutboxWrite::QuestStarted {
                quest_number,
                started_at,
            } => store.save_quest_start(user_id, *quest_number, *started_at),
            OutboxWrite::QuestCompleted {
                quest_number,
                xp_awarded,
                completed_at,
            } => store.save_quest_completion(user_id, *quest_number, *xp_awarded, *completed_at),
            OutboxWrite::XpEntry { entry } => store.save_xp_entry(user_id, entry),
            OutboxWrite::AchievementProgress {
                achievement_id,
                value,
            } => store.save_achievement_progress(user_id, achievement_id, *value),
            OutboxWrite::AchievementUnlocked {
                achievement_id,
                xp_awarded,
                unlocked_at,
            } => store.save_achievement_unlock(user_id, achievement_id, *xp_awarded, *unlocked_at),
            OutboxWrite::EventProcessed {
                event_type,
                reference_id,
                processed_at,
            } => store.save_processed_event(user_id, event_type, reference_id, *processed_at),
        }
    }
}

/// Queued write with delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub id: String,
    pub user_id: String,
    pub write: OutboxWrite,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Retry and batching limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub batch_size: usize,
}

impl RetryPolicy {
    /// Delay before retry number `attempts` (1-based): base * 2^(attempts-1), capped.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(20);
        let factor = 1i32 << exponent;
        (self.base_backoff * factor).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_backoff: Duration::seconds(2),
            max_backoff: Duration::seconds(300),
            batch_size: 50,
        }
    }
}

/// Outcome of one `flush` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    pub remaining: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OutboxFile {
    #[serde(default)]
    pending: VecDeque<PendingWrite>,
    #[serde(default)]
    dead: Vec<PendingWrite>,
}

/// FIFO outbox with backoff and a dead-letter list.
#[derive(Debug)]
pub struct Outbox {
    pending: VecDeque<PendingWrite>,
    dead: Vec<PendingWrite>,
    policy: RetryPolicy,
    /// Persistent queue file path. `None` keeps the outbox in memory.
    path: Option<PathBuf>,
}

impl Outbox {
    /// Outbox backed by `<data dir>/outbox.json`.
    pub fn open(policy: RetryPolicy) -> Result<Self> {
        let path = data_dir()?.join("outbox.json");
        Self::open_at(path, policy)
    }

    /// Outbox backed by a specific file, loading anything already queued.
    pub fn open_at(path: PathBuf, policy: RetryPolicy) -> Result<Self> {
        let mut outbox = Self {
            pending: VecDeque::new(),
            dead: Vec::new(),
            policy,
            path: Some(path),
        };
        outbox.load()?;
        Ok(outbox)
    }

    /// Outbox that is never written to disk.
    pub fn in_memory(policy: RetryPolicy) -> Self {
        Self {
            pending: VecDeque::new(),
            dead: Vec::new(),
            policy,
            path: None,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Queue a write, due immediately.
    pub fn enqueue(&mut self, user_id: &str, write: OutboxWrite, now: DateTime<Utc>) {
        if let Some(key) = write.coalesce_key() {
            if let Some(queued) = self
                .pending
                .iter_mut()
                .find(|p| p.user_id == user_id && p.write.coalesce_key() == Some(key))
            {
                queued.write = write;
                return;
            }
        }

        self.pending.push_back(PendingWrite {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            write,
            enqueued_at: now,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
        });
    }

    /// Deliver due writes in order. Stops at the first failure so later
    /// writes never overtake an earlier one.
    pub fn flush<S: ProgressStore + ?Sized>(&mut self, store: &S, now: DateTime<Utc>) -> FlushReport {
        let mut report = FlushReport::default();

        while report.delivered < self.policy.batch_size {
            let Some(head) = self.pending.front_mut() else {
                break;
            };
            if head.next_attempt_at > now {
                break;
            }

            match head.write.deliver(store, &head.user_id) {
                Ok(()) => {
                    self.pending.pop_front();
                    report.delivered += 1;
                }
                Err(e) => {
                    head.attempts += 1;
                    head.last_error = Some(e.to_string());
                    report.failed += 1;

                    if head.attempts >= self.policy.max_attempts {
                        tracing::error!(
                            write_id = %head.id,
                            attempts = head.attempts,
                            error = %e,
                            "outbox write dead-lettered"
                        );
                        if let Some(dead) = self.pending.pop_front() {
                            self.dead.push(dead);
                        }
                        report.dead_lettered += 1;
                        continue;
                    }

                    head.next_attempt_at = now + self.policy.backoff(head.attempts);
                    tracing::warn!(
                        write_id = %head.id,
                        attempts = head.attempts,
                        retry_at = %head.next_attempt_at,
                        error = %e,
                        "outbox delivery failed"
                    );
                    break;
                }
            }
        }

        report.remaining = self.pending.len();
        report
    }

    /// Pending writes for one user, oldest first.
    pub fn pending_for<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a PendingWrite> + 'a {
        self.pending.iter().filter(move |p| p.user_id == user_id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingWrite> {
        self.pending.iter()
    }

    pub fn dead_letters(&self) -> &[PendingWrite] {
        &self.dead
    }

    /// Dead letters for one user, oldest first.
    pub fn dead_letters_for<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a PendingWrite> + 'a {
        self.dead.iter().filter(move |p| p.user_id == user_id)
    }

    /// Move dead letters back to the queue, due at `now`.
    pub fn requeue_dead(&mut self, now: DateTime<Utc>) -> usize {
        let count = self.dead.len();
        for mut write in self.dead.drain(..) {
            write.attempts = 0;
            write.next_attempt_at = now;
            self.pending.push_back(write);
        }
        count
    }

    /// Time until the head write is due. `None` when empty.
    pub fn time_until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.pending.front().map(|p| {
            if p.next_attempt_at > now {
                p.next_attempt_at - now
            } else {
                Duration::zero()
            }
        })
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Persist queue to disk. No-op for in-memory outboxes.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = OutboxFile {
            pending: self.pending.clone(),
            dead: self.dead.clone(),
        };
        let data = serde_json::to_string_pretty(&file)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Load queue from disk, replacing what is in memory.
    pub fn load(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let file: OutboxFile = serde_json::from_str(&content)?;
        self.pending = file.pending;
        self.dead = file.dead;
        Ok(())
    }
}
