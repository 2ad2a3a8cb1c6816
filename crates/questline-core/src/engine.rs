//! Session-scoped progression service.
//!
//! [`ProgressionEngine`] owns one user's [`ProgressionState`] and is the only
//! way to mutate it. Each public method is one synchronous step: it updates
//! memory, queues the resulting store writes in the outbox, and buffers the
//! notifications the UI should show.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::achievements::{AchievementEngine, AchievementRegistry, ProgressChange, UnlockedAchievement};
use crate::error::Result;
use crate::events::{Event, EventContext, EventType, ProgressEvent, QUEST_NUMBER_KEY};
use crate::quest::{QuestStatus, QuestTransition};
use crate::state::ProgressionState;
use crate::storage::{Config, Database, ProgressStore};
use crate::sync::{FlushReport, Outbox, OutboxWrite};
use crate::xp::{LevelProgress, XpAward};

/// Everything one step changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepReport {
    /// XP granted by this step, achievements included.
    pub xp_awarded: u64,
    pub total_xp: u64,
    pub previous_level: u32,
    pub level: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quest: Option<QuestTransition>,
    pub journey_complete: bool,
    pub progress: Vec<ProgressChange>,
    pub unlocked: Vec<UnlockedAchievement>,
    /// The event was already rewarded earlier and was ignored.
    pub replay: bool,
}

impl StepReport {
    pub fn leveled_up(&self) -> bool {
        self.level > self.previous_level
    }
}

/// Progression service for one user session.
///
/// Construct with [`open`](Self::open), which loads the stored state before
/// returning, so no step can run against a half-loaded session.
#[derive(Debug)]
pub struct ProgressionEngine<S: ProgressStore> {
    state: ProgressionState,
    achievements: AchievementEngine,
    store: S,
    outbox: Outbox,
    events: Vec<Event>,
}

impl ProgressionEngine<Database> {
    /// Open the local SQLite store, outbox and registry named by `config`.
    pub fn open_local(config: &Config) -> Result<Self> {
        let registry = match config.registry_path() {
            Some(path) => AchievementRegistry::load(&path)?,
            None => AchievementRegistry::builtin(),
        };
        for issue in registry.issues() {
            tracing::warn!(error = %issue, "achievement registry issue");
        }

        let store = Database::open()?;
        let outbox = Outbox::open(config.outbox.retry_policy())?;
        Self::open(
            &config.profile.user_id,
            store,
            AchievementEngine::new(registry),
            outbox,
        )
    }
}

impl<S: ProgressStore> ProgressionEngine<S> {
    /// Start a session: deliver what the outbox can, load the stored
    /// snapshot, then re-apply writes the store still has not seen.
    /// Dead letters are re-applied too; they stay local truth until retried.
    pub fn open(
        user_id: &str,
        store: S,
        achievements: AchievementEngine,
        mut outbox: Outbox,
    ) -> Result<Self> {
        let report = outbox.flush(&store, Utc::now());
        if report.delivered > 0 || report.failed > 0 {
            tracing::debug!(?report, "outbox flushed on open");
        }

        let stored = store.load_progression_state(user_id)?;
        let mut state = ProgressionState::from_stored(user_id, stored);

        let mut replayed = 0usize;
        for pending in outbox.dead_letters_for(user_id).chain(outbox.pending_for(user_id)) {
            state.replay(&pending.write);
            replayed += 1;
        }
        outbox.persist()?;

        tracing::info!(
            user = user_id,
            total_xp = state.ledger.total_xp(),
            unlocked = state.achievements.unlocked_count(),
            replayed,
            "progression loaded"
        );

        Ok(Self {
            state,
            achievements,
            store,
            outbox,
            events: Vec::new(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.state.user_id
    }

    pub fn state(&self) -> &ProgressionState {
        &self.state
    }

    pub fn registry(&self) -> &AchievementRegistry {
        self.achievements.registry()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn pending_writes(&self) -> usize {
        self.outbox.pending_for(&self.state.user_id).count()
    }

    // -- Quests --

    pub fn quest_status(&self, number: u8) -> Option<QuestStatus> {
        self.state.quests.status(number)
    }

    pub fn current_quest_number(&self) -> Option<u8> {
        self.state.quests.current_quest_number()
    }

    /// Mark an available quest as begun. Anything else is a no-op.
    pub fn start_quest(&mut self, number: u8) -> bool {
        let now = Utc::now();
        if !self.state.quests.start(number, now) {
            tracing::debug!(quest = number, "start ignored");
            return false;
        }

        self.enqueue(
            OutboxWrite::QuestStarted {
                quest_number: number,
                started_at: now,
            },
            now,
        );
        self.events.push(Event::QuestStarted {
            quest_number: number,
            at: now,
        });
        self.commit();
        true
    }

    /// Complete a quest, grant its XP once, unlock the next quest and run
    /// the `quest_completion` achievements. Repeats and locked quests
    /// leave state untouched.
    pub fn complete_quest(&mut self, number: u8, xp: u32) -> StepReport {
        let now = Utc::now();
        let mut report = self.begin_report();
        self.complete_quest_at(number, xp, None, now, &mut report);
        self.finish_report(&mut report);
        self.commit();
        report
    }

    fn complete_quest_at(
        &mut self,
        number: u8,
        xp: u32,
        description: Option<String>,
        now: DateTime<Utc>,
        report: &mut StepReport,
    ) {
        let transition = self.state.quests.complete(number, xp, now);
        report.quest = Some(transition);

        let QuestTransition::Completed {
            next_unlocked,
            journey_complete,
            ..
        } = transition
        else {
            tracing::debug!(quest = number, ?transition, "quest completion ignored");
            return;
        };

        self.enqueue(
            OutboxWrite::QuestCompleted {
                quest_number: number,
                xp_awarded: xp,
                completed_at: now,
            },
            now,
        );
        let description = description.unwrap_or_else(|| format!("Quest {number} completed"));
        if let Some(award) = self.grant(
            xp,
            EventType::QUEST_COMPLETION,
            Some(number.to_string()),
            Some(description),
            now,
        ) {
            report.xp_awarded += award.entry.as_ref().map_or(0, |e| u64::from(e.amount));
        }

        tracing::info!(quest = number, xp, ?next_unlocked, "quest completed");
        self.events.push(Event::QuestCompleted {
            quest_number: number,
            xp_awarded: xp,
            next_unlocked,
            at: now,
        });
        if journey_complete {
            tracing::info!(user = %self.state.user_id, "journey complete");
            self.events.push(Event::JourneyComplete { at: now });
            report.journey_complete = true;
        }

        let mut context = EventContext::new();
        context.insert(QUEST_NUMBER_KEY.to_string(), number.into());
        self.run_achievements(&EventType::QUEST_COMPLETION, &context, now, report);
    }

    // -- XP --

    /// Append an XP entry unconditionally. De-duplication is the caller's job.
    pub fn award_xp(
        &mut self,
        amount: u32,
        source: EventType,
        reference_id: Option<String>,
        description: Option<String>,
    ) -> XpAward {
        let now = Utc::now();
        let award = self
            .grant(amount, source, reference_id, description, now)
            .unwrap_or_else(|| self.unchanged_award());
        self.commit();
        award
    }

    pub fn total_xp(&self) -> u64 {
        self.state.ledger.total_xp()
    }

    pub fn level(&self) -> u32 {
        self.state.ledger.level()
    }

    pub fn level_progress(&self) -> LevelProgress {
        self.state.ledger.level_progress()
    }

    // -- Achievements --

    /// Bump counters of counter-based definitions listening to `event_type`.
    pub fn increment_progress(&mut self, event_type: &EventType, amount: u64) -> Vec<ProgressChange> {
        let now = Utc::now();
        let changes = self.bump_progress(event_type, amount, now);
        self.commit();
        changes
    }

    /// Unlock whatever `event_type` and `context` satisfy. Safe to repeat.
    pub fn check_achievements(
        &mut self,
        event_type: &EventType,
        context: &EventContext,
    ) -> Vec<UnlockedAchievement> {
        let now = Utc::now();
        let unlocked = self.unlock_matching(event_type, context, now);
        self.commit();
        unlocked
    }

    // -- Events --

    /// Run one UI event through the engine: direct XP, counters,
    /// achievements, and quest completion for `quest_completion` events.
    pub fn record(&mut self, event: ProgressEvent) -> StepReport {
        let now = Utc::now();
        let mut report = self.begin_report();

        if event.event_type.is_blank() {
            tracing::debug!("ignoring event with blank type");
            self.finish_report(&mut report);
            return report;
        }

        if event.event_type == EventType::QUEST_COMPLETION {
            match event.quest_number() {
                Some(number) => self.complete_quest_at(
                    number,
                    event.xp.unwrap_or(0),
                    event.description.clone(),
                    now,
                    &mut report,
                ),
                None => tracing::warn!("quest_completion event without a valid quest number"),
            }
            self.finish_report(&mut report);
            self.commit();
            return report;
        }

        if let Some(reference_id) = event.reference_id.as_deref() {
            if !self.state.mark_processed(&event.event_type, reference_id) {
                tracing::debug!(
                    event_type = %event.event_type,
                    reference = reference_id,
                    "event already processed"
                );
                report.replay = true;
                self.finish_report(&mut report);
                return report;
            }
            self.enqueue(
                OutboxWrite::EventProcessed {
                    event_type: event.event_type.clone(),
                    reference_id: reference_id.to_string(),
                    processed_at: now,
                },
                now,
            );
        }

        if let Some(xp) = event.xp.filter(|xp| *xp > 0) {
            if let Some(award) = self.grant(
                xp,
                event.event_type.clone(),
                event.reference_id.clone(),
                event.description.clone(),
                now,
            ) {
                report.xp_awarded += award.entry.as_ref().map_or(0, |e| u64::from(e.amount));
            }
        }
        self.run_achievements(&event.event_type, &event.context, now, &mut report);

        self.finish_report(&mut report);
        self.commit();
        report
    }

    /// Take the notifications buffered since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Deliver due outbox writes to the store.
    pub fn flush_outbox(&mut self) -> FlushReport {
        self.flush_outbox_at(Utc::now())
    }

    pub fn flush_outbox_at(&mut self, now: DateTime<Utc>) -> FlushReport {
        let report = self.outbox.flush(&self.store, now);
        if report.delivered > 0 || report.failed > 0 {
            self.commit();
        }
        report
    }

    /// Put dead-lettered writes back in the queue.
    pub fn retry_dead_letters(&mut self) -> usize {
        let count = self.outbox.requeue_dead(Utc::now());
        if count > 0 {
            self.commit();
        }
        count
    }

    // -- internals --

    fn run_achievements(
        &mut self,
        event_type: &EventType,
        context: &EventContext,
        now: DateTime<Utc>,
        report: &mut StepReport,
    ) {
        report.progress.extend(self.bump_progress(event_type, 1, now));
        let unlocked = self.unlock_matching(event_type, context, now);
        report.xp_awarded += unlocked.iter().map(|u| u64::from(u.xp_awarded)).sum::<u64>();
        report.unlocked.extend(unlocked);
    }

    fn bump_progress(&mut self, event_type: &EventType, amount: u64, now: DateTime<Utc>) -> Vec<ProgressChange> {
        let changes = self
            .achievements
            .increment_progress(&mut self.state.achievements, event_type, amount);
        for change in &changes {
            self.enqueue(
                OutboxWrite::AchievementProgress {
                    achievement_id: change.achievement_id.clone(),
                    value: change.value,
                },
                now,
            );
        }
        changes
    }

    fn unlock_matching(
        &mut self,
        event_type: &EventType,
        context: &EventContext,
        now: DateTime<Utc>,
    ) -> Vec<UnlockedAchievement> {
        let unlocked = self.achievements.check_achievements(
            &mut self.state.achievements,
            &mut self.state.ledger,
            event_type,
            context,
            now,
        );

        for item in &unlocked {
            let definition = &item.achievement;
            self.enqueue(
                OutboxWrite::AchievementUnlocked {
                    achievement_id: definition.id.clone(),
                    xp_awarded: item.xp_awarded,
                    unlocked_at: now,
                },
                now,
            );
            self.events.push(Event::AchievementUnlocked {
                achievement_id: definition.id.clone(),
                name: definition.name.clone(),
                category: definition.category,
                rarity: definition.rarity,
                xp_awarded: item.xp_awarded,
                at: now,
            });
            if let Some(award) = &item.award {
                self.after_award(award, now);
            }
        }
        unlocked
    }

    /// Append to the ledger and queue the entry. `None` for zero amounts.
    fn grant(
        &mut self,
        amount: u32,
        source: EventType,
        reference_id: Option<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<XpAward> {
        if amount == 0 {
            return None;
        }
        let award = self
            .state
            .ledger
            .award(amount, source, reference_id, description, now);
        self.after_award(&award, now);
        Some(award)
    }

    fn after_award(&mut self, award: &XpAward, now: DateTime<Utc>) {
        let Some(entry) = &award.entry else {
            return;
        };

        self.enqueue(OutboxWrite::XpEntry { entry: entry.clone() }, now);
        self.events.push(Event::XpAwarded {
            amount: entry.amount,
            source: entry.source.clone(),
            reference_id: entry.reference_id.clone(),
            total_xp: award.total_xp,
            at: now,
        });

        if award.leveled_up() {
            tracing::info!(
                from = award.previous_level,
                to = award.level,
                total_xp = award.total_xp,
                "level up"
            );
            self.events.push(Event::LevelUp {
                from_level: award.previous_level,
                to_level: award.level,
                total_xp: award.total_xp,
                at: now,
            });
        }
    }

    fn unchanged_award(&self) -> XpAward {
        let level = self.level();
        XpAward {
            entry: None,
            total_xp: self.total_xp(),
            previous_level: level,
            level,
        }
    }

    fn enqueue(&mut self, write: OutboxWrite, now: DateTime<Utc>) {
        self.outbox.enqueue(&self.state.user_id, write, now);
    }

    fn begin_report(&self) -> StepReport {
        StepReport {
            previous_level: self.level(),
            ..StepReport::default()
        }
    }

    fn finish_report(&self, report: &mut StepReport) {
        report.total_xp = self.total_xp();
        report.level = self.level();
    }

    /// Persist the outbox. Failures are logged, never surfaced.
    fn commit(&mut self) {
        if let Err(e) = self.outbox.persist() {
            tracing::warn!(error = %e, pending = self.outbox.len(), "failed to persist outbox");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RetryPolicy;

    fn engine() -> ProgressionEngine<Database> {
        ProgressionEngine::open(
            "u1",
            Database::open_memory().unwrap(),
            AchievementEngine::new(AchievementRegistry::builtin()),
            Outbox::in_memory(RetryPolicy::default()),
        )
        .unwrap()
    }

    #[test]
    fn complete_first_quest() {
        let mut engine = engine();
        let report = engine.complete_quest(1, 100);

        assert_eq!(engine.quest_status(1), Some(QuestStatus::Completed));
        assert_eq!(engine.quest_status(2), Some(QuestStatus::Available));
        assert_eq!(engine.current_quest_number(), Some(2));
        assert!(report.quest.unwrap().is_first_completion());
        // Quest XP plus the first_steps achievement.
        assert!(report.unlocked.iter().any(|u| u.achievement.id == "first_steps"));
        assert_eq!(report.total_xp, engine.total_xp());
        assert_eq!(
            engine.state().ledger.entries_for_reference("1").count(),
            1
        );
    }

    #[test]
    fn repeated_completion_grants_once() {
        let mut engine = engine();
        engine.complete_quest(1, 100);
        let after_first = engine.total_xp();
        let report = engine.complete_quest(1, 100);

        assert_eq!(engine.total_xp(), after_first);
        assert_eq!(report.xp_awarded, 0);
        assert_eq!(report.quest, Some(QuestTransition::AlreadyCompleted { number: 1 }));
    }

    #[test]
    fn locked_quest_is_rejected() {
        let mut engine = engine();
        engine.drain_events();
        let report = engine.complete_quest(3, 100);

        assert!(matches!(report.quest, Some(QuestTransition::Rejected { .. })));
        assert_eq!(engine.total_xp(), 0);
        assert_eq!(engine.quest_status(3), Some(QuestStatus::Locked));
        assert!(engine.drain_events().is_empty());
        assert_eq!(engine.pending_writes(), 0);
    }

    #[test]
    fn start_quest_only_once() {
        let mut engine = engine();
        assert!(engine.start_quest(1));
        assert!(!engine.start_quest(1));
        assert!(!engine.start_quest(2));
        assert_eq!(engine.drain_events().len(), 1);
    }

    #[test]
    fn events_report_level_up() {
        let mut engine = engine();
        engine.award_xp(150, EventType::MANUAL, None, None);
        let events = engine.drain_events();

        assert!(events.iter().any(|e| matches!(
            e,
            Event::LevelUp {
                from_level: 1,
                to_level: 2,
                ..
            }
        )));
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn zero_xp_award_changes_nothing() {
        let mut engine = engine();
        let award = engine.award_xp(0, EventType::MANUAL, None, None);
        assert!(award.entry.is_none());
        assert_eq!(engine.pending_writes(), 0);
    }

    #[test]
    fn record_replay_is_ignored() {
        let mut engine = engine();
        let join = ProgressEvent::new(EventType::HACKATHON_JOIN)
            .with_xp(25)
            .with_reference("hack-1");

        let first = engine.record(join.clone());
        assert!(!first.replay);
        assert_eq!(first.xp_awarded, 25 + 50);

        let second = engine.record(join);
        assert!(second.replay);
        assert_eq!(second.xp_awarded, 0);
        assert_eq!(engine.state().achievements.counter("hackathon_regular"), 1);
    }

    #[test]
    fn record_reference_without_xp_counts_once() {
        let mut engine = engine();
        let join = ProgressEvent::new(EventType::HACKATHON_JOIN).with_reference("hack-1");

        let replays: Vec<bool> = (0..3).map(|_| engine.record(join.clone()).replay).collect();
        assert_eq!(replays, [false, true, true]);
        assert_eq!(engine.state().achievements.counter("hackathon_regular"), 1);
        assert!(!engine.state().achievements.is_unlocked("hackathon_regular"));
        assert!(engine.state().is_processed(&EventType::HACKATHON_JOIN, "hack-1"));
    }

    #[test]
    fn reference_matching_achievement_id_is_not_a_replay() {
        let mut engine = engine();
        let first = engine.record(ProgressEvent::new(EventType::HACKATHON_JOIN).with_reference("hack-1"));
        assert!(first.unlocked.iter().any(|u| u.achievement.id == "first_hackathon"));

        let second = engine.record(
            ProgressEvent::new(EventType::HACKATHON_JOIN).with_reference("first_hackathon"),
        );
        assert!(!second.replay);
        assert_eq!(engine.state().achievements.counter("hackathon_regular"), 2);
    }

    #[test]
    fn record_quest_completion_event() {
        let mut engine = engine();
        let report = engine.record(ProgressEvent::quest_completion(1, 100));
        assert_eq!(engine.quest_status(1), Some(QuestStatus::Completed));
        assert!(report.quest.is_some());

        let missing = engine.record(ProgressEvent::new(EventType::QUEST_COMPLETION));
        assert!(missing.quest.is_none());
        assert_eq!(missing.xp_awarded, 0);
    }

    #[test]
    fn unknown_event_type_changes_nothing() {
        let mut engine = engine();
        let unlocked = engine.check_achievements(&EventType::new("mystery"), &EventContext::new());
        assert!(unlocked.is_empty());
        assert_eq!(engine.total_xp(), 0);
        assert_eq!(engine.pending_writes(), 0);
    }

    #[test]
    fn flush_delivers_to_store() {
        let mut engine = engine();
        engine.complete_quest(1, 100);
        assert!(engine.pending_writes() > 0);

        let report = engine.flush_outbox();
        assert_eq!(report.remaining, 0);
        assert_eq!(engine.store().total_xp("u1").unwrap(), engine.total_xp());
    }
}
