use std::sync::Arc;

use orfo_core::Clock;
use orfo_core::model::UserId;
use storage::repository::{CategoryRepository, LedgerRepository};

use crate::error::QuizError;
use crate::mistakes::{BrowseEntry, MistakeBrowser, Page};
use crate::quiz::engine::{AnswerOutcome, QuestionPrompt, QuizReport, QuizSession, Step};
use crate::session::{Session, is_command};
use crate::store::SessionStore;

/// Largest completion report delivered inline; longer ones go through the
/// paginated browse contract.
pub const INLINE_REPORT_MAX: usize = 10;

/// First prompt of a fresh session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizStarted {
    pub category: String,
    pub round: u32,
    pub prompt: QuestionPrompt,
}

/// How a completion report reaches the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDelivery {
    NoMistakes,
    Inline(Vec<String>),
    Paged(Page<BrowseEntry>),
}

/// Result of one answered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizProgress {
    Next {
        outcome: AnswerOutcome,
        round: u32,
        prompt: QuestionPrompt,
    },
    Finished {
        report: QuizReport,
        delivery: ReportDelivery,
    },
    Cancelled,
}

/// Orchestrates quiz sessions over the session store, writing every wrong
/// answer through to the ledger as it happens.
#[derive(Clone)]
pub struct QuizLoopService {
    clock: Clock,
    categories: Arc<dyn CategoryRepository>,
    ledger: Arc<dyn LedgerRepository>,
    sessions: SessionStore,
}

impl QuizLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        categories: Arc<dyn CategoryRepository>,
        ledger: Arc<dyn LedgerRepository>,
        sessions: SessionStore,
    ) -> Self {
        Self {
            clock,
            categories,
            ledger,
            sessions,
        }
    }

    /// Starts a quiz over one category, superseding whatever session the
    /// user had.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::UnknownCategory` or `QuizError::EmptyCategory`
    /// without touching the user's session, or `QuizError::Storage` on
    /// repository failures.
    pub async fn start_quiz(
        &self,
        user: &UserId,
        category: &str,
    ) -> Result<QuizStarted, QuizError> {
        let _gate = self.sessions.guard(user).await;
        let found = self
            .categories
            .get_category(user, category)
            .await?
            .ok_or_else(|| QuizError::UnknownCategory(category.to_owned()))?;

        let now = self.clock.now();
        let name = found.name().to_owned();
        let mut rng = rand::rng();
        let (quiz, prompt) = QuizSession::start(&name, found.into_questions(), now, &mut rng)?;
        let round = quiz.round();
        self.sessions.set(user, Session::Quiz(quiz), now);
        Ok(QuizStarted {
            category: name,
            round,
            prompt,
        })
    }

    /// Applies one answer and advances the session.
    ///
    /// A command token cancels the session without penalty. A wrong answer
    /// increments the ledger before the next prompt is chosen. On completion
    /// the session is destroyed; reports longer than `INLINE_REPORT_MAX`
    /// install a browse session holding the missed list.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Stale` when no quiz session is active, or
    /// `QuizError::EngineInvariant` when the engine aborts the session.
    pub async fn answer(&self, user: &UserId, input: &str) -> Result<QuizProgress, QuizError> {
        let _gate = self.sessions.guard(user).await;
        let now = self.clock.now();

        if is_command(input) {
            self.sessions.clear(user);
            return Ok(QuizProgress::Cancelled);
        }

        let stored = self.sessions.take(user).ok_or(QuizError::Stale)?;
        let mut quiz = match stored.session {
            Session::Quiz(quiz) => quiz,
            other => {
                self.sessions.put_back(user, other, stored.stored_at);
                return Err(QuizError::Stale);
            }
        };

        let outcome = quiz.answer(input)?;
        if let AnswerOutcome::Wrong { pair, .. } = &outcome {
            self.ledger.increment(user, quiz.category(), pair).await?;
        }

        let mut rng = rand::rng();
        match quiz.advance(now, &mut rng)? {
            Step::Ask(prompt) => {
                let round = quiz.round();
                self.sessions
                    .put_back(user, Session::Quiz(quiz), stored.stored_at);
                Ok(QuizProgress::Next {
                    outcome,
                    round,
                    prompt,
                })
            }
            Step::Finished(report) => {
                let delivery = if report.missed.is_empty() {
                    ReportDelivery::NoMistakes
                } else if report.missed.len() <= INLINE_REPORT_MAX {
                    ReportDelivery::Inline(report.missed.clone())
                } else {
                    let browser = MistakeBrowser::from_answers(report.missed.clone());
                    let page = browser.page();
                    self.sessions.set(user, Session::Browse(browser), now);
                    ReportDelivery::Paged(page)
                };
                Ok(QuizProgress::Finished { report, delivery })
            }
        }
    }
}
