//! Shared error types for the services crate.

use thiserror::Error;

use orfo_core::model::{CategoryError, QuestionError, ScheduleError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the quiz engine and its workflow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("category has no questions")]
    EmptyCategory,

    #[error("no quiz session is active")]
    Stale,

    #[error("no question is awaiting an answer")]
    NoActiveQuestion,

    #[error("round refill produced no candidates")]
    EngineInvariant,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the shared-pool game.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GlobalGameError {
    #[error("the shared pool has no questions")]
    EmptyPool,

    #[error("no global game is active")]
    Stale,

    #[error("no question is awaiting an answer")]
    NoActiveQuestion,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the reminder scheduler and schedule configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReminderError {
    #[error("no reminder is awaiting an answer")]
    Stale,

    #[error("weighted selection failed: {0}")]
    Selection(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by mistake browsing and maintenance.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MistakeError {
    #[error("no mistakes recorded")]
    NoMistakes,

    #[error("no listing is open")]
    Stale,

    #[error("unknown mistake entry")]
    UnknownEntry,

    #[error("count may only be lowered, current value is {current}")]
    NotLower { current: u32 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by category and question management.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("category already exists: {0}")]
    DuplicateCategory(String),

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("you have no categories yet")]
    NoCategories,

    #[error("nothing matched the search")]
    NoMatches,

    #[error("the session is stale, start over")]
    Stale,

    #[error("confirm with 1 or cancel with 0")]
    InvalidConfirmation,

    #[error(transparent)]
    Question(#[from] QuestionError),

    #[error(transparent)]
    Category(#[from] CategoryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
