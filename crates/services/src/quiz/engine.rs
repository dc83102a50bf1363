use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;

use orfo_core::model::Question;

use crate::error::QuizError;

/// Correct answers in a row needed to retire a question within a session.
pub const MASTERY_TARGET: u32 = 2;

//
// ─── PROMPT ────────────────────────────────────────────────────────────────────
//

/// The two variants of the current question, in randomized left/right order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionPrompt {
    options: [String; 2],
}

impl QuestionPrompt {
    /// Builds a prompt for a question, shuffling which side each variant
    /// lands on.
    pub fn present(question: &Question, rng: &mut impl Rng) -> Self {
        let mut options = [question.front().to_owned(), question.back().to_owned()];
        if rng.random_bool(0.5) {
            options.swap(0, 1);
        }
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &[String; 2] {
        &self.options
    }
}

//
// ─── SESSION STATE ─────────────────────────────────────────────────────────────
//

/// One snapshot entry: the question plus its session-scoped mastery counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizCard {
    question: Question,
    mastery: u32,
}

impl QuizCard {
    #[must_use]
    pub fn question(&self) -> &Question {
        &self.question
    }

    #[must_use]
    pub fn mastery(&self) -> u32 {
        self.mastery
    }

    #[must_use]
    pub fn is_mastered(&self) -> bool {
        self.mastery >= MASTERY_TARGET
    }
}

/// Completion summary: how long the session ran and, in snapshot order, the
/// correct answer of every question that was ever answered wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizReport {
    pub rounds: u32,
    pub elapsed: Duration,
    pub missed: Vec<String>,
}

/// What the engine wants next: ask another question or report completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Ask(QuestionPrompt),
    Finished(QuizReport),
}

/// Result of matching an answer against the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    Correct { mastery: u32 },
    Wrong { pair: String, correct: String },
}

/// Round-based mastery state machine over one category snapshot.
///
/// Rounds 1 and 2 queue every question so each is seen at least twice; later
/// rounds queue only questions below the mastery target. The session is
/// complete when every snapshot entry reaches the target.
#[derive(Debug, Clone)]
pub struct QuizSession {
    category: String,
    snapshot: Vec<QuizCard>,
    queue: Vec<usize>,
    round: u32,
    errors: HashMap<String, String>,
    started_at: DateTime<Utc>,
    current: Option<usize>,
}

impl QuizSession {
    /// Snapshots the category's questions with mastery reset to zero and
    /// produces the first prompt of round 1.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyCategory` when there is nothing to quiz.
    pub fn start(
        category: impl Into<String>,
        questions: Vec<Question>,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Result<(Self, QuestionPrompt), QuizError> {
        if questions.is_empty() {
            return Err(QuizError::EmptyCategory);
        }
        let snapshot: Vec<QuizCard> = questions
            .into_iter()
            .map(|question| QuizCard {
                question,
                mastery: 0,
            })
            .collect();
        let mut queue: Vec<usize> = (0..snapshot.len()).collect();
        queue.shuffle(rng);

        let mut session = Self {
            category: category.into(),
            snapshot,
            queue,
            round: 1,
            errors: HashMap::new(),
            started_at: now,
            current: None,
        };
        match session.advance(now, rng)? {
            Step::Ask(prompt) => Ok((session, prompt)),
            // A fresh non-empty snapshot cannot already be complete.
            Step::Finished(_) => Err(QuizError::EngineInvariant),
        }
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn round(&self) -> u32 {
        self.round
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn cards(&self) -> &[QuizCard] {
        &self.snapshot
    }

    /// The question currently awaiting an answer, if any.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.current.map(|idx| &self.snapshot[idx].question)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.snapshot.iter().all(QuizCard::is_mastered)
    }

    /// Picks the next prompt, refilling the round queue as needed, or
    /// reports completion. Invoked after `start` and after every answer.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EngineInvariant` when a refill produces no
    /// candidates even though completion was not detected; the session is no
    /// longer usable.
    pub fn advance(
        &mut self,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Result<Step, QuizError> {
        if self.is_complete() {
            let missed = self
                .snapshot
                .iter()
                .filter(|card| self.errors.contains_key(&card.question.pair_key()))
                .map(|card| card.question.back().to_owned())
                .collect();
            return Ok(Step::Finished(QuizReport {
                rounds: self.round,
                elapsed: now - self.started_at,
                missed,
            }));
        }

        if self.queue.is_empty() {
            self.round += 1;
            self.queue = if self.round <= 2 {
                // Early rounds revisit everything, mastered or not, so each
                // question is seen at least twice overall.
                (0..self.snapshot.len()).collect()
            } else {
                self.snapshot
                    .iter()
                    .enumerate()
                    .filter(|(_, card)| !card.is_mastered())
                    .map(|(idx, _)| idx)
                    .collect()
            };
            if self.queue.is_empty() {
                return Err(QuizError::EngineInvariant);
            }
            self.queue.shuffle(rng);
        }

        // Shuffled again on every pull, not just at round start.
        self.queue.shuffle(rng);
        let idx = self.queue.remove(0);
        self.current = Some(idx);
        Ok(Step::Ask(QuestionPrompt::present(
            &self.snapshot[idx].question,
            rng,
        )))
    }

    /// Matches the chosen variant against the current question: a correct
    /// answer bumps mastery, a wrong one resets it to zero and records the
    /// question in the session error set. Clears the current question either
    /// way; call `advance` next.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoActiveQuestion` when nothing is awaiting an
    /// answer.
    pub fn answer(&mut self, choice: &str) -> Result<AnswerOutcome, QuizError> {
        let idx = self.current.take().ok_or(QuizError::NoActiveQuestion)?;
        let card = &mut self.snapshot[idx];
        if choice.trim() == card.question.back() {
            card.mastery = (card.mastery + 1).min(MASTERY_TARGET);
            Ok(AnswerOutcome::Correct {
                mastery: card.mastery,
            })
        } else {
            card.mastery = 0;
            let pair = card.question.pair_key();
            let correct = card.question.back().to_owned();
            self.errors.insert(pair.clone(), correct.clone());
            Ok(AnswerOutcome::Wrong { pair, correct })
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
