mod category;
mod ids;
mod mistake;
mod question;
mod schedule;

pub use category::{
    CATEGORY_NAME_MAX_CHARS, Category, CategoryError, NaturalPiece, natural_key, natural_sort,
};
pub use ids::UserId;
pub use mistake::{MistakeRecord, sort_for_listing};
pub use question::{
    MAX_CHAR_RUN, PAIR_SEPARATOR, Question, QuestionDraft, QuestionError, VARIANT_MAX_CHARS,
};
pub use schedule::{ReminderTime, ScheduleError};
