use crate::error::{Result, SchedulerError};
use crate::spaced_repetition::{Outcome, ReviewScheduler, SrsRecord, Transition};
use crate::time_format::format_optional;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Persistence used by a review session
pub trait SrsStore {
    fn load_record(&self, item_id: i64, scope: &str) -> Result<Option<SrsRecord>>;

    /// Persists the record produced by `transition` and logs the transition,
    /// returning the id of the logged event
    fn record_transition(&self, transition: &Transition) -> Result<i64>;

    /// Replaces a logged transition and the record it produced
    fn amend_transition(&self, event_id: i64, transition: &Transition) -> Result<()>;

    fn item_exists(&self, item_id: i64) -> Result<bool>;
}

/// Result of one persisted level change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewApplied {
    pub previous_level: i64,
    pub new_level: i64,
    pub next_due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub answered: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub retracted: usize,
}

/// Latest answer of an item, kept so it can be retracted exactly
#[derive(Debug, Clone)]
struct AnsweredQuestion {
    event_id: i64,
    transition: Transition,
    retracted: bool,
}

/// Drives one learner through a queue of items in a single scope
pub struct ReviewSession<'a, S: SrsStore + ?Sized> {
    store: &'a S,
    scheduler: ReviewScheduler,
    scope: String,
    queue: VecDeque<i64>,
    answered_order: Vec<i64>,
    last_answers: HashMap<i64, AnsweredQuestion>,
    summary: SessionSummary,
}

impl<'a, S: SrsStore + ?Sized> ReviewSession<'a, S> {
    pub fn new(store: &'a S, scheduler: ReviewScheduler, scope: &str, items: impl IntoIterator<Item = i64>) -> Self {
        ReviewSession {
            store,
            scheduler,
            scope: scope.to_string(),
            queue: items.into_iter().collect(),
            answered_order: Vec::new(),
            last_answers: HashMap::new(),
            summary: SessionSummary::default(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    /// Next item to ask about. Once the queue runs dry, answered items that
    /// are due again at `now` are put back in answer order.
    pub fn next_item(&mut self, now: DateTime<Utc>) -> Result<Option<i64>> {
        if self.queue.is_empty() {
            for item_id in &self.answered_order {
                let record = self.store.load_record(*item_id, &self.scope)?;
                if self.scheduler.is_due(record.as_ref(), now) {
                    debug!("Item {} is due again, re-queuing", item_id);
                    self.queue.push_back(*item_id);
                }
            }
        }
        Ok(self.queue.pop_front())
    }

    /// Applies one answer to an item and persists the new level.
    ///
    /// Every call applies a transition; submitting the same answer twice
    /// moves the item twice.
    pub fn apply_review(&mut self, item_id: i64, outcome: Outcome, now: DateTime<Utc>) -> Result<ReviewApplied> {
        if !self.store.item_exists(item_id)? {
            return Err(SchedulerError::ItemNotFound(item_id));
        }

        let record = self.store.load_record(item_id, &self.scope)?;
        let transition = self
            .scheduler
            .transition(item_id, &self.scope, record.as_ref(), outcome, now);
        let event_id = self.store.record_transition(&transition)?;

        match outcome {
            Outcome::Correct => self.summary.correct += 1,
            Outcome::Incorrect => self.summary.incorrect += 1,
        }
        self.summary.answered += 1;
        if !self.answered_order.contains(&item_id) {
            self.answered_order.push(item_id);
        }

        let applied = self.applied(&transition);
        info!(
            "Item {} answered {}: level {} -> {}, next review {}",
            item_id,
            outcome,
            transition.previous_level,
            transition.new_level,
            format_optional(now, applied.next_due_at)
        );

        self.last_answers.insert(
            item_id,
            AnsweredQuestion {
                event_id,
                transition,
                retracted: false,
            },
        );
        Ok(applied)
    }

    /// Turns the latest incorrect answer of an item into a correct one.
    ///
    /// The level is recomputed from the level the item had before that
    /// answer, and the clock restarts at the time of the original answer.
    pub fn retract(&mut self, item_id: i64) -> Result<ReviewApplied> {
        let answer = self
            .last_answers
            .get_mut(&item_id)
            .filter(|answer| !answer.retracted && answer.transition.outcome == Outcome::Incorrect)
            .ok_or(SchedulerError::NothingToRetract(item_id))?;

        let corrected = Transition {
            new_level: ReviewScheduler::next_level(answer.transition.previous_level, Outcome::Correct),
            outcome: Outcome::Correct,
            ..answer.transition.clone()
        };
        self.store.amend_transition(answer.event_id, &corrected)?;

        info!(
            "Retracted incorrect answer for item {}: level {} -> {} instead of {}",
            item_id, corrected.previous_level, corrected.new_level, answer.transition.new_level
        );

        answer.transition = corrected;
        answer.retracted = true;
        self.summary.incorrect -= 1;
        self.summary.correct += 1;
        self.summary.retracted += 1;

        let transition = answer.transition.clone();
        Ok(self.applied(&transition))
    }

    /// Moves an unseen item into the review cycle at level 1
    pub fn enter_cycle(&mut self, item_id: i64, now: DateTime<Utc>) -> Result<ReviewApplied> {
        if !self.store.item_exists(item_id)? {
            return Err(SchedulerError::ItemNotFound(item_id));
        }

        let record = self.store.load_record(item_id, &self.scope)?;
        if let Some(record) = record.as_ref().filter(|r| !r.is_unseen()) {
            return Err(SchedulerError::AlreadyInCycle {
                item_id,
                level: SrsRecord::level_of(Some(record)),
            });
        }

        let transition = self
            .scheduler
            .transition(item_id, &self.scope, record.as_ref(), Outcome::Correct, now);
        self.store.record_transition(&transition)?;

        let applied = self.applied(&transition);
        info!(
            "Item {} entered the review cycle in scope '{}', first review {}",
            item_id,
            self.scope,
            format_optional(now, applied.next_due_at)
        );
        Ok(applied)
    }

    fn applied(&self, transition: &Transition) -> ReviewApplied {
        ReviewApplied {
            previous_level: transition.previous_level,
            new_level: transition.new_level,
            next_due_at: self.scheduler.next_due_at(&transition.to_record()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval_table::{IntervalTable, MAX_LEVEL, UNSEEN_LEVEL};
    use crate::spaced_repetition::DEFAULT_SCOPE;
    use chrono::{Duration, NaiveDate};
    use std::cell::RefCell;

    #[derive(Default)]
    struct InMemoryStore {
        items: Vec<i64>,
        records: RefCell<HashMap<(i64, String), SrsRecord>>,
        events: RefCell<Vec<Transition>>,
    }

    impl InMemoryStore {
        fn with_items(items: &[i64]) -> Self {
            InMemoryStore {
                items: items.to_vec(),
                ..Default::default()
            }
        }

        fn seed(&self, item_id: i64, level: i64, time_created: DateTime<Utc>) {
            self.records.borrow_mut().insert(
                (item_id, DEFAULT_SCOPE.to_string()),
                SrsRecord::new(item_id, DEFAULT_SCOPE, level, time_created),
            );
        }

        fn record(&self, item_id: i64) -> Option<SrsRecord> {
            self.records
                .borrow()
                .get(&(item_id, DEFAULT_SCOPE.to_string()))
                .cloned()
        }
    }

    impl SrsStore for InMemoryStore {
        fn load_record(&self, item_id: i64, scope: &str) -> Result<Option<SrsRecord>> {
            Ok(self.records.borrow().get(&(item_id, scope.to_string())).cloned())
        }

        fn record_transition(&self, transition: &Transition) -> Result<i64> {
            self.records.borrow_mut().insert(
                (transition.item_id, transition.scope.clone()),
                transition.to_record(),
            );
            let mut events = self.events.borrow_mut();
            events.push(transition.clone());
            Ok(events.len() as i64)
        }

        fn amend_transition(&self, event_id: i64, transition: &Transition) -> Result<()> {
            self.records.borrow_mut().insert(
                (transition.item_id, transition.scope.clone()),
                transition.to_record(),
            );
            self.events.borrow_mut()[(event_id - 1) as usize] = transition.clone();
            Ok(())
        }

        fn item_exists(&self, item_id: i64) -> Result<bool> {
            Ok(self.items.contains(&item_id))
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn session(store: &InMemoryStore, items: Vec<i64>) -> ReviewSession<'_, InMemoryStore> {
        ReviewSession::new(store, ReviewScheduler::default(), DEFAULT_SCOPE, items)
    }

    #[test]
    fn test_correct_answer_promotes_and_resets_clock() {
        let store = InMemoryStore::with_items(&[1]);
        store.seed(1, 3, fixed_now() - Duration::days(4));
        let mut session = session(&store, vec![1]);

        let applied = session.apply_review(1, Outcome::Correct, fixed_now()).unwrap();

        assert_eq!(applied.previous_level, 3);
        assert_eq!(applied.new_level, 4);
        assert_eq!(applied.next_due_at, Some(fixed_now() + Duration::days(7)));
        assert_eq!(store.record(1), Some(SrsRecord::new(1, DEFAULT_SCOPE, 4, fixed_now())));
    }

    #[test]
    fn test_level_nine_correct_stays_and_resets_clock() {
        let store = InMemoryStore::with_items(&[1]);
        store.seed(1, 9, fixed_now() - Duration::days(200));
        let mut session = session(&store, vec![1]);

        let applied = session.apply_review(1, Outcome::Correct, fixed_now()).unwrap();

        assert_eq!(applied.new_level, 9);
        assert_eq!(store.record(1).unwrap().time_created, Some(fixed_now()));
    }

    #[test]
    fn test_incorrect_answer_from_level_two() {
        let store = InMemoryStore::with_items(&[1]);
        store.seed(1, 2, fixed_now() - Duration::days(2));
        let mut session = session(&store, vec![1]);

        let applied = session.apply_review(1, Outcome::Incorrect, fixed_now()).unwrap();

        assert_eq!((applied.previous_level, applied.new_level), (2, 1));
        assert_eq!(applied.next_due_at, Some(fixed_now() + Duration::minutes(10)));
    }

    #[test]
    fn test_unseen_item_answered_enters_cycle() {
        let store = InMemoryStore::with_items(&[1]);
        let mut session = session(&store, vec![1]);

        let applied = session.apply_review(1, Outcome::Incorrect, fixed_now()).unwrap();

        assert_eq!((applied.previous_level, applied.new_level), (0, 1));
        assert!(store.events.borrow()[0].is_first_entry());
    }

    #[test]
    fn test_unknown_item_is_rejected() {
        let store = InMemoryStore::with_items(&[]);
        let mut session = session(&store, vec![]);
        assert!(matches!(
            session.apply_review(42, Outcome::Correct, fixed_now()),
            Err(SchedulerError::ItemNotFound(42))
        ));
        assert!(store.events.borrow().is_empty());
    }

    #[test]
    fn test_retraction_is_exact() {
        let store = InMemoryStore::with_items(&[1]);
        let answered_at = fixed_now() - Duration::minutes(1);
        store.seed(1, 5, fixed_now() - Duration::days(30));
        let mut session = session(&store, vec![1]);

        session.apply_review(1, Outcome::Incorrect, answered_at).unwrap();
        assert_eq!(store.record(1).unwrap().level, Some(4));

        let applied = session.retract(1).unwrap();

        assert_eq!((applied.previous_level, applied.new_level), (5, 6));
        assert_eq!(store.record(1), Some(SrsRecord::new(1, DEFAULT_SCOPE, 6, answered_at)));
        let events = store.events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, Outcome::Correct);
        assert_eq!(events[0].new_level, 6);
    }

    #[test]
    fn test_retraction_is_exact_from_every_level() {
        let intervals = IntervalTable::default();
        for level in UNSEEN_LEVEL..=MAX_LEVEL {
            let store = InMemoryStore::with_items(&[1]);
            let answered_at = fixed_now() - Duration::minutes(3);
            store.seed(1, level, fixed_now() - Duration::days(400));
            let mut session = session(&store, vec![1]);

            session.apply_review(1, Outcome::Incorrect, answered_at).unwrap();
            let applied = session.retract(1).unwrap();

            let expected = ReviewScheduler::next_level(level, Outcome::Correct);
            assert_eq!((applied.previous_level, applied.new_level), (level, expected), "from level {}", level);
            assert_eq!(
                applied.next_due_at,
                Some(answered_at + intervals.interval(expected)),
                "from level {}",
                level
            );
            assert_eq!(
                store.record(1),
                Some(SrsRecord::new(1, DEFAULT_SCOPE, expected, answered_at)),
                "from level {}",
                level
            );
            assert_eq!(store.events.borrow().len(), 1, "from level {}", level);
        }
    }

    #[test]
    fn test_retracting_first_entry_keeps_single_event() {
        let store = InMemoryStore::with_items(&[1]);
        let mut session = session(&store, vec![1]);

        session.apply_review(1, Outcome::Incorrect, fixed_now()).unwrap();
        let applied = session.retract(1).unwrap();

        assert_eq!((applied.previous_level, applied.new_level), (0, 1));
        let events = store.events.borrow();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_first_entry());
    }

    #[test]
    fn test_retract_rejections() {
        let store = InMemoryStore::with_items(&[1, 2]);
        let mut session = session(&store, vec![1, 2]);

        assert!(matches!(session.retract(1), Err(SchedulerError::NothingToRetract(1))));

        session.apply_review(1, Outcome::Correct, fixed_now()).unwrap();
        assert!(matches!(session.retract(1), Err(SchedulerError::NothingToRetract(1))));

        session.apply_review(2, Outcome::Incorrect, fixed_now()).unwrap();
        session.retract(2).unwrap();
        assert!(matches!(session.retract(2), Err(SchedulerError::NothingToRetract(2))));
    }

    #[test]
    fn test_only_latest_answer_can_be_retracted() {
        let store = InMemoryStore::with_items(&[1]);
        store.seed(1, 3, fixed_now() - Duration::days(10));
        let mut session = session(&store, vec![1]);

        session.apply_review(1, Outcome::Incorrect, fixed_now()).unwrap();
        session
            .apply_review(1, Outcome::Correct, fixed_now() + Duration::minutes(5))
            .unwrap();

        assert!(matches!(session.retract(1), Err(SchedulerError::NothingToRetract(1))));
        assert_eq!(store.record(1).unwrap().level, Some(3));
    }

    #[test]
    fn test_summary_counts() {
        let store = InMemoryStore::with_items(&[1, 2, 3]);
        let mut session = session(&store, vec![1, 2, 3]);

        session.apply_review(1, Outcome::Correct, fixed_now()).unwrap();
        session.apply_review(2, Outcome::Incorrect, fixed_now()).unwrap();
        session.apply_review(3, Outcome::Incorrect, fixed_now()).unwrap();
        session.retract(3).unwrap();

        assert_eq!(
            session.summary(),
            &SessionSummary {
                answered: 3,
                correct: 2,
                incorrect: 1,
                retracted: 1,
            }
        );
    }

    #[test]
    fn test_next_item_requeues_items_due_again() {
        let store = InMemoryStore::with_items(&[1, 2]);
        store.seed(2, 5, fixed_now() - Duration::days(40));
        let mut session = session(&store, vec![1, 2]);

        assert_eq!(session.next_item(fixed_now()).unwrap(), Some(1));
        session.apply_review(1, Outcome::Incorrect, fixed_now()).unwrap();
        assert_eq!(session.next_item(fixed_now()).unwrap(), Some(2));
        session.apply_review(2, Outcome::Correct, fixed_now()).unwrap();

        assert_eq!(session.next_item(fixed_now() + Duration::minutes(5)).unwrap(), None);

        let later = fixed_now() + Duration::minutes(10);
        assert_eq!(session.next_item(later).unwrap(), Some(1));
        session.apply_review(1, Outcome::Correct, later).unwrap();
        assert_eq!(session.next_item(later).unwrap(), None);
    }

    #[test]
    fn test_enter_cycle() {
        let store = InMemoryStore::with_items(&[1, 2]);
        store.seed(2, 0, fixed_now() - Duration::days(1));
        let mut session = session(&store, vec![]);

        let applied = session.enter_cycle(1, fixed_now()).unwrap();
        assert_eq!((applied.previous_level, applied.new_level), (0, 1));
        assert_eq!(applied.next_due_at, Some(fixed_now() + Duration::minutes(10)));

        session.enter_cycle(2, fixed_now()).unwrap();
        assert_eq!(store.record(2).unwrap().level, Some(1));

        assert!(matches!(
            session.enter_cycle(1, fixed_now()),
            Err(SchedulerError::AlreadyInCycle { item_id: 1, level: 1 })
        ));
        assert_eq!(session.summary().answered, 0);
    }
}
