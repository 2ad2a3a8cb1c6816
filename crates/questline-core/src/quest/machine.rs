//! Quest state machine.
//!
//! ## State Transitions
//!
//! ```text
//! Locked -> Available -> Completed
//! ```
//!
//! Quest 1 starts `Available`. Completing quest k makes quest k+1
//! `Available`. There are no backward transitions, and a `Locked` quest
//! cannot be completed out of order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of quests in the onboarding journey.
pub const QUEST_COUNT: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatus {
    Locked,
    Available,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub number: u8,
    pub status: QuestStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub xp_awarded: u32,
}

/// Persisted shape of a quest row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestRecord {
    pub quest_number: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub xp_awarded: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Locked,
    UnknownQuest,
}

/// Outcome of `complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QuestTransition {
    Completed {
        number: u8,
        /// Quest made available by this completion.
        next_unlocked: Option<u8>,
        /// True when `number` was the final quest.
        journey_complete: bool,
    },
    AlreadyCompleted {
        number: u8,
    },
    Rejected {
        number: u8,
        reason: RejectReason,
    },
}

impl QuestTransition {
    pub fn is_first_completion(&self) -> bool {
        matches!(self, QuestTransition::Completed { .. })
    }
}

/// The ordered set of quests for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestLog {
    quests: Vec<Quest>,
}

impl QuestLog {
    pub fn new(count: u8) -> Self {
        let quests = (1..=count)
            .map(|number| Quest {
                number,
                status: if number == 1 {
                    QuestStatus::Available
                } else {
                    QuestStatus::Locked
                },
                started_at: None,
                completed_at: None,
                xp_awarded: 0,
            })
            .collect();
        Self { quests }
    }

    /// Rebuild from stored rows. Completion comes from the rows;
    /// availability is re-derived from the unlock chain.
    pub fn from_records(count: u8, records: &[QuestRecord]) -> Self {
        let mut log = Self::new(count);
        for record in records {
            let Some(quest) = log.quest_mut(record.quest_number) else {
                tracing::warn!(quest = record.quest_number, "ignoring stored row for unknown quest");
                continue;
            };
            quest.started_at = record.started_at.or(quest.started_at);
            if let Some(completed_at) = record.completed_at {
                quest.status = QuestStatus::Completed;
                quest.completed_at = Some(completed_at);
                quest.xp_awarded = record.xp_awarded;
            }
        }
        log.rederive_availability();
        log
    }

    pub fn count(&self) -> u8 {
        self.quests.len() as u8
    }

    pub fn quests(&self) -> &[Quest] {
        &self.quests
    }

    pub fn quest(&self, number: u8) -> Option<&Quest> {
        number
            .checked_sub(1)
            .and_then(|idx| self.quests.get(idx as usize))
    }

    fn quest_mut(&mut self, number: u8) -> Option<&mut Quest> {
        number
            .checked_sub(1)
            .and_then(|idx| self.quests.get_mut(idx as usize))
    }

    /// Pure read. `None` for quest numbers outside the log.
    pub fn status(&self, number: u8) -> Option<QuestStatus> {
        self.quest(number).map(|q| q.status)
    }

    /// Lowest-numbered quest not yet completed; `None` once all are done.
    pub fn current_quest_number(&self) -> Option<u8> {
        self.quests
            .iter()
            .find(|q| q.status != QuestStatus::Completed)
            .map(|q| q.number)
    }

    pub fn completed_count(&self) -> usize {
        self.quests
            .iter()
            .filter(|q| q.status == QuestStatus::Completed)
            .count()
    }

    pub fn is_journey_complete(&self) -> bool {
        self.completed_count() == self.quests.len()
    }

    /// Record that the user began an available quest. Returns true only
    /// the first time; anything else is a no-op.
    pub fn start(&mut self, number: u8, at: DateTime<Utc>) -> bool {
        match self.quest_mut(number) {
            Some(quest) if quest.status == QuestStatus::Available && quest.started_at.is_none() => {
                quest.started_at = Some(at);
                true
            }
            _ => false,
        }
    }

    /// Complete an available quest and unlock its successor. XP is the
    /// caller's job, and only on `Completed`.
    pub fn complete(&mut self, number: u8, xp: u32, at: DateTime<Utc>) -> QuestTransition {
        let count = self.count();
        let Some(quest) = self.quest_mut(number) else {
            return QuestTransition::Rejected {
                number,
                reason: RejectReason::UnknownQuest,
            };
        };

        let status = quest.status;
        match status {
            QuestStatus::Completed => QuestTransition::AlreadyCompleted { number },
            QuestStatus::Locked => QuestTransition::Rejected {
                number,
                reason: RejectReason::Locked,
            },
            QuestStatus::Available => {
                quest.status = QuestStatus::Completed;
                quest.completed_at = Some(at);
                quest.started_at.get_or_insert(at);
                quest.xp_awarded = xp;

                let next_unlocked = if number < count {
                    let next = number + 1;
                    match self.quest_mut(next) {
                        Some(next_quest) if next_quest.status == QuestStatus::Locked => {
                            next_quest.status = QuestStatus::Available;
                            Some(next)
                        }
                        _ => None,
                    }
                } else {
                    None
                };

                QuestTransition::Completed {
                    number,
                    next_unlocked,
                    journey_complete: number == count,
                }
            }
        }
    }

    fn rederive_availability(&mut self) {
        let mut previous_completed = true;
        for quest in &mut self.quests {
            if quest.status != QuestStatus::Completed {
                quest.status = if previous_completed {
                    QuestStatus::Available
                } else {
                    QuestStatus::Locked
                };
            }
            previous_completed = quest.status == QuestStatus::Completed;
        }
    }
}

impl Default for QuestLog {
    fn default() -> Self {
        Self::new(QUEST_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_unlock_chain(log: &QuestLog) {
        for k in 2..=log.count() {
            let available = log.status(k) == Some(QuestStatus::Available);
            let expected = log.status(k - 1) == Some(QuestStatus::Completed)
                && log.status(k) != Some(QuestStatus::Completed);
            assert_eq!(available, expected, "unlock chain broken at quest {k}");
        }
    }

    #[test]
    fn fresh_log_has_only_first_available() {
        let log = QuestLog::default();
        assert_eq!(log.count(), QUEST_COUNT);
        assert_eq!(log.status(1), Some(QuestStatus::Available));
        for k in 2..=QUEST_COUNT {
            assert_eq!(log.status(k), Some(QuestStatus::Locked));
        }
        assert_eq!(log.status(0), None);
        assert_eq!(log.status(9), None);
        assert_eq!(log.current_quest_number(), Some(1));
        assert_unlock_chain(&log);
    }

    #[test]
    fn completing_unlocks_next() {
        let mut log = QuestLog::default();
        let t = log.complete(1, 100, Utc::now());
        assert_eq!(
            t,
            QuestTransition::Completed {
                number: 1,
                next_unlocked: Some(2),
                journey_complete: false
            }
        );
        assert_eq!(log.status(1), Some(QuestStatus::Completed));
        assert_eq!(log.status(2), Some(QuestStatus::Available));
        assert_eq!(log.quest(1).unwrap().xp_awarded, 100);
        assert_eq!(log.current_quest_number(), Some(2));
        assert_unlock_chain(&log);
    }

    #[test]
    fn second_completion_is_noop() {
        let mut log = QuestLog::default();
        let first_at = Utc::now();
        log.complete(1, 100, first_at);
        let t = log.complete(1, 500, Utc::now());
        assert_eq!(t, QuestTransition::AlreadyCompleted { number: 1 });
        assert_eq!(log.quest(1).unwrap().xp_awarded, 100);
        assert_eq!(log.quest(1).unwrap().completed_at, Some(first_at));
    }

    #[test]
    fn locked_and_unknown_quests_are_rejected() {
        let mut log = QuestLog::default();
        let before = log.clone();
        assert_eq!(
            log.complete(3, 100, Utc::now()),
            QuestTransition::Rejected {
                number: 3,
                reason: RejectReason::Locked
            }
        );
        assert_eq!(
            log.complete(42, 100, Utc::now()),
            QuestTransition::Rejected {
                number: 42,
                reason: RejectReason::UnknownQuest
            }
        );
        assert_eq!(log, before);
    }

    #[test]
    fn final_quest_reports_journey_complete() {
        let mut log = QuestLog::default();
        for n in 1..QUEST_COUNT {
            log.complete(n, 10, Utc::now());
        }
        let t = log.complete(QUEST_COUNT, 10, Utc::now());
        assert_eq!(
            t,
            QuestTransition::Completed {
                number: QUEST_COUNT,
                next_unlocked: None,
                journey_complete: true
            }
        );
        assert!(log.is_journey_complete());
        assert_eq!(log.current_quest_number(), None);
        assert_eq!(log.count(), QUEST_COUNT);
    }

    #[test]
    fn start_only_on_available() {
        let mut log = QuestLog::default();
        assert!(!log.start(2, Utc::now()));
        assert!(log.start(1, Utc::now()));
        assert!(!log.start(1, Utc::now()));
        assert!(log.quest(2).unwrap().started_at.is_none());
        assert_eq!(log.status(1), Some(QuestStatus::Available));
    }

    #[test]
    fn from_records_rederives_availability() {
        let now = Utc::now();
        let records = vec![
            QuestRecord {
                quest_number: 1,
                started_at: Some(now),
                completed_at: Some(now),
                xp_awarded: 100,
            },
            QuestRecord {
                quest_number: 2,
                started_at: Some(now),
                completed_at: None,
                xp_awarded: 0,
            },
            // Gap left by an older client: 4 completed while 3 was not.
            QuestRecord {
                quest_number: 4,
                started_at: None,
                completed_at: Some(now),
                xp_awarded: 100,
            },
            QuestRecord {
                quest_number: 12,
                started_at: None,
                completed_at: Some(now),
                xp_awarded: 100,
            },
        ];

        let log = QuestLog::from_records(QUEST_COUNT, &records);
        assert_eq!(log.status(1), Some(QuestStatus::Completed));
        assert_eq!(log.status(2), Some(QuestStatus::Available));
        assert_eq!(log.quest(2).unwrap().started_at, Some(now));
        assert_eq!(log.status(3), Some(QuestStatus::Locked));
        assert_eq!(log.status(4), Some(QuestStatus::Completed));
        assert_eq!(log.status(5), Some(QuestStatus::Available));
        assert_eq!(log.current_quest_number(), Some(2));
        assert_unlock_chain(&log);
    }
}
