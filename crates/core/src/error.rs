use thiserror::Error;

use crate::model::{CategoryError, QuestionError, ScheduleError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Category(#[from] CategoryError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}
