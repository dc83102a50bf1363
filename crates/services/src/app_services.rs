use std::sync::Arc;

use tokio::task::JoinHandle;

use orfo_core::Clock;
use storage::repository::Storage;

use crate::catalog::CatalogService;
use crate::error::AppServicesError;
use crate::global::GlobalGameService;
use crate::mistakes::MistakeService;
use crate::notify::Notifier;
use crate::quiz::QuizLoopService;
use crate::reminder::{ReminderScheduler, ScheduleService, spawn_scheduler};
use crate::store::{SessionStore, spawn_sweeper};

/// Assembles the service graph over one storage backend and one session
/// store.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    sessions: SessionStore,
    quiz: Arc<QuizLoopService>,
    global: Arc<GlobalGameService>,
    catalog: Arc<CatalogService>,
    mistakes: Arc<MistakeService>,
    schedule: Arc<ScheduleService>,
    reminders: Arc<ReminderScheduler>,
}

impl AppServices {
    #[must_use]
    pub fn new(storage: &Storage, clock: Clock, notifier: Arc<dyn Notifier>) -> Self {
        let sessions = SessionStore::with_default_ttl();

        let quiz = Arc::new(QuizLoopService::new(
            clock,
            Arc::clone(&storage.categories),
            Arc::clone(&storage.ledger),
            sessions.clone(),
        ));
        let global = Arc::new(GlobalGameService::new(
            clock,
            Arc::clone(&storage.pool),
            sessions.clone(),
        ));
        let catalog = Arc::new(CatalogService::new(
            clock,
            Arc::clone(&storage.categories),
            Arc::clone(&storage.ledger),
            Arc::clone(&storage.pool),
            sessions.clone(),
        ));
        let mistakes = Arc::new(MistakeService::new(
            clock,
            Arc::clone(&storage.ledger),
            sessions.clone(),
        ));
        let schedule = Arc::new(ScheduleService::new(Arc::clone(&storage.schedule)));
        let reminders = Arc::new(ReminderScheduler::new(
            clock,
            Arc::clone(&storage.ledger),
            Arc::clone(&storage.schedule),
            sessions.clone(),
            notifier,
        ));

        Self {
            clock,
            sessions,
            quiz,
            global,
            catalog,
            mistakes,
            schedule,
            reminders,
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(&storage, clock, notifier))
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn quiz(&self) -> Arc<QuizLoopService> {
        Arc::clone(&self.quiz)
    }

    #[must_use]
    pub fn global(&self) -> Arc<GlobalGameService> {
        Arc::clone(&self.global)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn mistakes(&self) -> Arc<MistakeService> {
        Arc::clone(&self.mistakes)
    }

    #[must_use]
    pub fn schedule(&self) -> Arc<ScheduleService> {
        Arc::clone(&self.schedule)
    }

    #[must_use]
    pub fn reminders(&self) -> Arc<ReminderScheduler> {
        Arc::clone(&self.reminders)
    }

    /// Spawns the two background loops: the reminder tick and the session
    /// TTL sweep. Call from within a tokio runtime.
    #[must_use]
    pub fn spawn_background(&self) -> BackgroundTasks {
        BackgroundTasks {
            scheduler: spawn_scheduler(Arc::clone(&self.reminders)),
            sweeper: spawn_sweeper(self.sessions.clone(), self.clock),
        }
    }
}

/// Handles for the background loops; abort them on shutdown.
pub struct BackgroundTasks {
    pub scheduler: JoinHandle<()>,
    pub sweeper: JoinHandle<()>,
}

impl BackgroundTasks {
    pub fn abort_all(&self) {
        self.scheduler.abort();
        self.sweeper.abort();
    }
}
