#![forbid(unsafe_code)]

pub mod app_services;
pub mod catalog;
pub mod error;
pub mod global;
pub mod mistakes;
pub mod notify;
pub mod quiz;
pub mod reminder;
pub mod session;
pub mod store;

pub use orfo_core::Clock;

pub use app_services::{AppServices, BackgroundTasks};
pub use error::{
    AppServicesError, CatalogError, GlobalGameError, MistakeError, QuizError, ReminderError,
};
pub use notify::{Notifier, NotifyError, NullNotifier};
pub use quiz::{
    AnswerOutcome, MASTERY_TARGET, QuestionPrompt, QuizLoopService, QuizProgress, QuizReport,
    QuizSession, QuizStarted, ReportDelivery, Step,
};
pub use session::{Session, SessionMode};
pub use store::{SESSION_TTL_SECS, SessionStore};
