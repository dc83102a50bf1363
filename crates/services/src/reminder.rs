use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use orfo_core::Clock;
use orfo_core::model::{MistakeRecord, Question, ReminderTime, UserId};
use storage::repository::{LedgerRepository, ScheduleRepository, ToggleOutcome};

use crate::error::ReminderError;
use crate::notify::Notifier;
use crate::quiz::QuestionPrompt;
use crate::session::Session;
use crate::store::SessionStore;

/// Tick period of the scheduler clock.
pub const TICK_PERIOD_SECS: u64 = 60;

/// The single question a scheduled reminder asks, held in the session store
/// until answered or swept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderAsk {
    pub category: String,
    pub pair: String,
    pub correct: String,
    pub prompt: QuestionPrompt,
}

/// Terminal outcome of a reminder answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderOutcome {
    /// The ledger entry was decremented; 0 means it is gone.
    Correct { remaining: u32 },
    Wrong { correct: String, count: u32 },
}

/// Weighted draw over ledger entries: weight is the mistake count, so
/// entries with more mistakes are proportionally more likely. Counts are
/// always ≥ 1, so a zero-weight draw cannot occur.
///
/// # Errors
///
/// Returns the underlying distribution error message for an empty slice.
pub fn pick_weighted<'a>(
    entries: &'a [MistakeRecord],
    rng: &mut impl Rng,
) -> Result<&'a MistakeRecord, String> {
    entries
        .choose_weighted(rng, |record| record.count)
        .map_err(|e| e.to_string())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Minute-granularity reminder dispatch.
///
/// Each tick handles the current `HH:MM` slot at most once, picks one
/// weighted mistake per due user, supersedes any dangling reminder prompt
/// and pushes the new one through the notifier. Delivery failures are
/// logged and otherwise ignored.
pub struct ReminderScheduler {
    clock: Clock,
    ledger: Arc<dyn LedgerRepository>,
    schedule: Arc<dyn ScheduleRepository>,
    sessions: SessionStore,
    notifier: Arc<dyn Notifier>,
    last_slot: Mutex<Option<ReminderTime>>,
}

impl ReminderScheduler {
    #[must_use]
    pub fn new(
        clock: Clock,
        ledger: Arc<dyn LedgerRepository>,
        schedule: Arc<dyn ScheduleRepository>,
        sessions: SessionStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clock,
            ledger,
            schedule,
            sessions,
            notifier,
            last_slot: Mutex::new(None),
        }
    }

    /// One tick at the clock's current time.
    ///
    /// # Errors
    ///
    /// Returns `ReminderError::Storage` on repository failures.
    pub async fn tick(&self) -> Result<usize, ReminderError> {
        self.tick_at(self.clock.now()).await
    }

    /// One tick at an explicit time. Returns how many reminders were
    /// dispatched; a repeated tick inside the same minute slot is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ReminderError::Storage` on repository failures.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<usize, ReminderError> {
        let slot = ReminderTime::from_datetime(now);
        {
            let mut last = lock(&self.last_slot);
            if *last == Some(slot) {
                return Ok(0);
            }
            *last = Some(slot);
        }

        let users = self.schedule.users_at(slot).await?;
        let mut dispatched = 0;
        for user in users {
            let _gate = self.sessions.guard(&user).await;
            let entries = self.ledger.entries(&user, None).await?;
            if entries.is_empty() {
                debug!(user = %user, "ledger empty, skipping reminder");
                continue;
            }

            let record = {
                let mut rng = rand::rng();
                pick_weighted(&entries, &mut rng)
                    .map_err(ReminderError::Selection)?
                    .clone()
            };
            let Some(question) = Question::from_pair_key(&record.pair) else {
                warn!(user = %user, pair = %record.pair, "malformed ledger pair, skipping");
                continue;
            };

            let ask = {
                let mut rng = rand::rng();
                ReminderAsk {
                    category: record.category.clone(),
                    pair: record.pair.clone(),
                    correct: question.back().to_owned(),
                    prompt: QuestionPrompt::present(&question, &mut rng),
                }
            };

            // A dangling prompt from an earlier tick is discarded here.
            self.sessions
                .set(&user, Session::ReminderQuiz(ask.clone()), now);
            if let Err(e) = self.notifier.deliver(&user, &ask).await {
                warn!(user = %user, error = %e, "reminder delivery failed");
            }
            dispatched += 1;
        }

        if dispatched > 0 {
            debug!(slot = %slot, dispatched, "reminder slot handled");
        }
        Ok(dispatched)
    }

    /// Applies the answer to a pending reminder. Single-question and
    /// terminal: the session ends either way.
    ///
    /// # Errors
    ///
    /// Returns `ReminderError::Stale` when no reminder is pending.
    pub async fn answer(
        &self,
        user: &UserId,
        input: &str,
    ) -> Result<ReminderOutcome, ReminderError> {
        let _gate = self.sessions.guard(user).await;
        let stored = self.sessions.take(user).ok_or(ReminderError::Stale)?;
        let ask = match stored.session {
            Session::ReminderQuiz(ask) => ask,
            other => {
                self.sessions.put_back(user, other, stored.stored_at);
                return Err(ReminderError::Stale);
            }
        };

        if input.trim() == ask.correct {
            let remaining = self
                .ledger
                .decrement_or_remove(user, &ask.category, &ask.pair)
                .await?;
            Ok(ReminderOutcome::Correct { remaining })
        } else {
            let count = self
                .ledger
                .increment(user, &ask.category, &ask.pair)
                .await?;
            Ok(ReminderOutcome::Wrong {
                correct: ask.correct,
                count,
            })
        }
    }
}

/// Spawns the minute tick loop.
pub fn spawn_scheduler(scheduler: Arc<ReminderScheduler>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(TICK_PERIOD_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = scheduler.tick().await {
                warn!(error = %e, "reminder tick failed");
            }
        }
    })
}

//
// ─── SCHEDULE CONFIGURATION ────────────────────────────────────────────────────
//

/// Toggle-semantics schedule configuration: submitting an existing time
/// removes it instead of duplicating it.
#[derive(Clone)]
pub struct ScheduleService {
    schedule: Arc<dyn ScheduleRepository>,
}

impl ScheduleService {
    #[must_use]
    pub fn new(schedule: Arc<dyn ScheduleRepository>) -> Self {
        Self { schedule }
    }

    /// Parses the submitted time and toggles it.
    ///
    /// # Errors
    ///
    /// Returns `ReminderError::Schedule` for anything but strict `HH:MM`;
    /// nothing is mutated then.
    pub async fn toggle(
        &self,
        user: &UserId,
        input: &str,
    ) -> Result<(ReminderTime, ToggleOutcome), ReminderError> {
        let at: ReminderTime = input.trim().parse()?;
        let outcome = self.schedule.toggle(user, at).await?;
        Ok((at, outcome))
    }

    /// The user's configured times, ascending.
    ///
    /// # Errors
    ///
    /// Returns `ReminderError::Storage` on repository failures.
    pub async fn times(&self, user: &UserId) -> Result<Vec<ReminderTime>, ReminderError> {
        Ok(self.schedule.times(user).await?)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn record(pair: &str, count: u32) -> MistakeRecord {
        MistakeRecord {
            category: "A".into(),
            pair: pair.into(),
            count,
        }
    }

    #[test]
    fn weighted_draw_follows_the_counts() {
        // Ledger {A:1, B:9}: B should be drawn roughly nine times as often.
        let entries = vec![record("a←x", 1), record("b←y", 9)];
        let mut rng = StdRng::seed_from_u64(42);
        let mut hits_b = 0usize;
        let draws = 10_000usize;
        for _ in 0..draws {
            if pick_weighted(&entries, &mut rng).unwrap().pair == "b←y" {
                hits_b += 1;
            }
        }
        let share = hits_b as f64 / draws as f64;
        assert!(
            (0.85..0.95).contains(&share),
            "expected ~0.9, got {share}"
        );
    }

    #[test]
    fn weighted_draw_over_single_entry_is_that_entry() {
        let entries = vec![record("a←x", 3)];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_weighted(&entries, &mut rng).unwrap().pair, "a←x");
    }

    #[test]
    fn weighted_draw_over_empty_slice_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick_weighted(&[], &mut rng).is_err());
    }
}
