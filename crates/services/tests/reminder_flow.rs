use std::sync::{Arc, Mutex};

use chrono::Duration;
use orfo_core::model::{ReminderTime, UserId};
use orfo_core::{fixed_clock, fixed_now};
use services::reminder::{ReminderAsk, ReminderOutcome};
use services::{AppServices, Notifier, NotifyError, ReminderError, SessionMode};
use storage::repository::{LedgerRepository, Storage, ToggleOutcome};

#[derive(Default)]
struct RecordingNotifier {
    delivered: Mutex<Vec<(UserId, ReminderAsk)>>,
}

impl RecordingNotifier {
    fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    fn last(&self) -> (UserId, ReminderAsk) {
        self.delivered.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, user: &UserId, ask: &ReminderAsk) -> Result<(), NotifyError> {
        self.delivered
            .lock()
            .unwrap()
            .push((user.clone(), ask.clone()));
        Ok(())
    }
}

/// A notifier whose transport always fails; dispatch state must survive it.
struct FailingNotifier;

#[async_trait::async_trait]
impl Notifier for FailingNotifier {
    async fn deliver(&self, _user: &UserId, _ask: &ReminderAsk) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("transport down".into()))
    }
}

fn build_with(notifier: Arc<dyn Notifier>) -> (AppServices, Storage) {
    let storage = Storage::in_memory();
    let services = AppServices::new(&storage, fixed_clock(), notifier);
    (services, storage)
}

// fixed_now() is 22:13 UTC; schedule that slot so tick_at(fixed_now()) is due.
const SLOT: &str = "22:13";

#[tokio::test]
async fn toggling_a_time_twice_removes_it() {
    let (services, _storage) = build_with(Arc::new(RecordingNotifier::default()));
    let user = UserId::new("u1");

    let (at, outcome) = services.schedule().toggle(&user, "08:00").await.unwrap();
    assert_eq!(at, "08:00".parse::<ReminderTime>().unwrap());
    assert_eq!(outcome, ToggleOutcome::Added);

    let (_, outcome) = services.schedule().toggle(&user, "08:00").await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Removed);

    assert!(services.schedule().times(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_times_are_rejected_without_mutation() {
    let (services, _storage) = build_with(Arc::new(RecordingNotifier::default()));
    let user = UserId::new("u1");

    for bad in ["8:00", "24:00", "12:60", "noon"] {
        let err = services.schedule().toggle(&user, bad).await.unwrap_err();
        assert!(matches!(err, ReminderError::Schedule(_)));
    }
    assert!(services.schedule().times(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn tick_skips_users_with_an_empty_ledger() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (services, _storage) = build_with(notifier.clone());
    let user = UserId::new("u1");

    services.schedule().toggle(&user, SLOT).await.unwrap();
    let dispatched = services.reminders().tick_at(fixed_now()).await.unwrap();

    assert_eq!(dispatched, 0);
    assert_eq!(notifier.count(), 0);
    assert!(services.sessions().get(&user).is_none());
}

#[tokio::test]
async fn tick_dispatches_one_weighted_question_per_due_user() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (services, storage) = build_with(notifier.clone());
    let user = UserId::new("u1");

    services.schedule().toggle(&user, SLOT).await.unwrap();
    storage.ledger.increment(&user, "Latin", "cat←felis").await.unwrap();

    let dispatched = services.reminders().tick_at(fixed_now()).await.unwrap();
    assert_eq!(dispatched, 1);
    assert_eq!(notifier.count(), 1);

    let (to, ask) = notifier.last();
    assert_eq!(to, user);
    assert_eq!(ask.category, "Latin");
    assert_eq!(ask.pair, "cat←felis");
    assert_eq!(ask.correct, "felis");
    let mut options = ask.prompt.options().clone();
    options.sort();
    assert_eq!(options, ["cat".to_string(), "felis".to_string()]);

    assert_eq!(
        services.sessions().get(&user).unwrap().mode(),
        SessionMode::ReminderQuiz
    );
}

#[tokio::test]
async fn a_slot_is_handled_at_most_once() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (services, storage) = build_with(notifier.clone());
    let user = UserId::new("u1");

    services.schedule().toggle(&user, SLOT).await.unwrap();
    storage.ledger.increment(&user, "Latin", "cat←felis").await.unwrap();

    assert_eq!(services.reminders().tick_at(fixed_now()).await.unwrap(), 1);
    // A second tick inside the same minute is a no-op.
    assert_eq!(
        services
            .reminders()
            .tick_at(fixed_now() + Duration::seconds(20))
            .await
            .unwrap(),
        0
    );
    assert_eq!(notifier.count(), 1);
}

#[tokio::test]
async fn a_new_slot_supersedes_the_dangling_prompt() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (services, storage) = build_with(notifier.clone());
    let user = UserId::new("u1");

    services.schedule().toggle(&user, "22:13").await.unwrap();
    services.schedule().toggle(&user, "22:14").await.unwrap();
    storage.ledger.increment(&user, "Latin", "cat←felis").await.unwrap();

    services.reminders().tick_at(fixed_now()).await.unwrap();
    services
        .reminders()
        .tick_at(fixed_now() + Duration::minutes(1))
        .await
        .unwrap();

    assert_eq!(notifier.count(), 2);
    // Still exactly one session: the later prompt replaced the earlier one.
    assert_eq!(services.sessions().len(), 1);
    assert_eq!(
        services.sessions().get(&user).unwrap().mode(),
        SessionMode::ReminderQuiz
    );
}

#[tokio::test]
async fn correct_reminder_answer_decrements_and_removes() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (services, storage) = build_with(notifier.clone());
    let user = UserId::new("u1");

    services.schedule().toggle(&user, SLOT).await.unwrap();
    storage.ledger.increment(&user, "Latin", "cat←felis").await.unwrap();
    storage.ledger.increment(&user, "Latin", "cat←felis").await.unwrap();

    services.reminders().tick_at(fixed_now()).await.unwrap();
    let outcome = services.reminders().answer(&user, "felis").await.unwrap();
    assert_eq!(outcome, ReminderOutcome::Correct { remaining: 1 });
    // Single-question and terminal.
    assert!(services.sessions().get(&user).is_none());

    let entries = storage.ledger.entries(&user, Some("Latin")).await.unwrap();
    assert_eq!(entries[0].count, 1);
}

#[tokio::test]
async fn wrong_reminder_answer_increments_and_ends() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (services, storage) = build_with(notifier.clone());
    let user = UserId::new("u1");

    services.schedule().toggle(&user, SLOT).await.unwrap();
    storage.ledger.increment(&user, "Latin", "cat←felis").await.unwrap();

    services.reminders().tick_at(fixed_now()).await.unwrap();
    let outcome = services.reminders().answer(&user, "cat").await.unwrap();
    assert_eq!(
        outcome,
        ReminderOutcome::Wrong {
            correct: "felis".into(),
            count: 2
        }
    );
    assert!(services.sessions().get(&user).is_none());

    let err = services.reminders().answer(&user, "felis").await.unwrap_err();
    assert!(matches!(err, ReminderError::Stale));
}

#[tokio::test]
async fn delivery_failure_is_non_fatal() {
    let (services, storage) = build_with(Arc::new(FailingNotifier));
    let user = UserId::new("u1");

    services.schedule().toggle(&user, SLOT).await.unwrap();
    storage.ledger.increment(&user, "Latin", "cat←felis").await.unwrap();

    // The tick succeeds and the session stays in place for the TTL sweep.
    let dispatched = services.reminders().tick_at(fixed_now()).await.unwrap();
    assert_eq!(dispatched, 1);
    assert_eq!(
        services.sessions().get(&user).unwrap().mode(),
        SessionMode::ReminderQuiz
    );
}

#[tokio::test]
async fn weighted_selection_prefers_frequent_mistakes() {
    // Statistical check over many fresh slots: with ledger {A:1, B:9} the
    // heavier pair should dominate the dispatches.
    let notifier = Arc::new(RecordingNotifier::default());
    let (services, storage) = build_with(notifier.clone());
    let user = UserId::new("u1");

    storage.ledger.increment(&user, "L", "a←x").await.unwrap();
    for _ in 0..9 {
        storage.ledger.increment(&user, "L", "b←y").await.unwrap();
    }

    let mut when = fixed_now();
    let mut scheduled = std::collections::HashSet::new();
    let draws = 300usize;
    for _ in 0..draws {
        let slot = ReminderTime::from_datetime(when).to_string();
        if scheduled.insert(slot.clone()) {
            services.schedule().toggle(&user, &slot).await.unwrap();
        }
        services.reminders().tick_at(when).await.unwrap();
        when = when + Duration::minutes(1);
    }

    let delivered = notifier.delivered.lock().unwrap();
    assert_eq!(delivered.len(), draws);
    let heavy = delivered.iter().filter(|(_, ask)| ask.pair == "b←y").count();
    let share = heavy as f64 / draws as f64;
    assert!(share > 0.75, "expected b←y to dominate, got {share}");
}
