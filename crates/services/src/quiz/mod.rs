mod engine;
mod workflow;

// Public API of the quiz subsystem.
pub use engine::{
    AnswerOutcome, MASTERY_TARGET, QuestionPrompt, QuizCard, QuizReport, QuizSession, Step,
};
pub use workflow::{INLINE_REPORT_MAX, QuizLoopService, QuizProgress, QuizStarted, ReportDelivery};
