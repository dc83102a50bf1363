use std::collections::VecDeque;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use orfo_core::Clock;
use orfo_core::model::{Question, UserId};
use storage::repository::PoolRepository;

use crate::error::GlobalGameError;
use crate::quiz::QuestionPrompt;
use crate::session::{Session, is_command};
use crate::store::SessionStore;

/// Session state for the shared-pool game: a pre-shuffled queue walked one
/// question at a time. No rounds, no mastery — a wrong answer ends it.
#[derive(Debug, Clone)]
pub struct GlobalGame {
    queue: VecDeque<Question>,
    current: Option<Question>,
}

impl GlobalGame {
    fn new(mut questions: Vec<Question>, rng: &mut impl Rng) -> Self {
        questions.shuffle(rng);
        Self {
            queue: questions.into(),
            current: None,
        }
    }

    fn next_prompt(&mut self, rng: &mut impl Rng) -> Option<QuestionPrompt> {
        let question = self.queue.pop_front()?;
        let prompt = QuestionPrompt::present(&question, rng);
        self.current = Some(question);
        Some(prompt)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// The question currently awaiting an answer, if any.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.current.as_ref()
    }
}

/// Result of one answered pool question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalOutcome {
    /// `next` is `None` when the pool is exhausted; the session has ended.
    Correct { next: Option<QuestionPrompt> },
    /// A wrong answer ends the game immediately.
    Wrong { correct: String },
    Cancelled,
}

/// Drives the cross-user shared-pool game.
#[derive(Clone)]
pub struct GlobalGameService {
    clock: Clock,
    pool: Arc<dyn PoolRepository>,
    sessions: SessionStore,
}

impl GlobalGameService {
    #[must_use]
    pub fn new(clock: Clock, pool: Arc<dyn PoolRepository>, sessions: SessionStore) -> Self {
        Self {
            clock,
            pool,
            sessions,
        }
    }

    /// Starts a game over the whole shared pool, superseding any prior
    /// session.
    ///
    /// # Errors
    ///
    /// Returns `GlobalGameError::EmptyPool` when there is nothing to play;
    /// no session is created then.
    pub async fn start(&self, user: &UserId) -> Result<QuestionPrompt, GlobalGameError> {
        let _gate = self.sessions.guard(user).await;
        let questions = self.pool.pool_questions().await?;
        if questions.is_empty() {
            return Err(GlobalGameError::EmptyPool);
        }

        let mut rng = rand::rng();
        let mut game = GlobalGame::new(questions, &mut rng);
        let prompt = game
            .next_prompt(&mut rng)
            .ok_or(GlobalGameError::EmptyPool)?;
        self.sessions
            .set(user, Session::GlobalGame(game), self.clock.now());
        Ok(prompt)
    }

    /// Applies one answer. Correct advances (or ends on exhaustion), wrong
    /// ends immediately, a command token cancels.
    ///
    /// # Errors
    ///
    /// Returns `GlobalGameError::Stale` when no game is active.
    pub async fn answer(
        &self,
        user: &UserId,
        input: &str,
    ) -> Result<GlobalOutcome, GlobalGameError> {
        let _gate = self.sessions.guard(user).await;

        if is_command(input) {
            self.sessions.clear(user);
            return Ok(GlobalOutcome::Cancelled);
        }

        let stored = self.sessions.take(user).ok_or(GlobalGameError::Stale)?;
        let mut game = match stored.session {
            Session::GlobalGame(game) => game,
            other => {
                self.sessions.put_back(user, other, stored.stored_at);
                return Err(GlobalGameError::Stale);
            }
        };

        let current = game
            .current
            .take()
            .ok_or(GlobalGameError::NoActiveQuestion)?;
        if input.trim() == current.back() {
            let mut rng = rand::rng();
            match game.next_prompt(&mut rng) {
                Some(prompt) => {
                    self.sessions
                        .put_back(user, Session::GlobalGame(game), stored.stored_at);
                    Ok(GlobalOutcome::Correct {
                        next: Some(prompt),
                    })
                }
                None => Ok(GlobalOutcome::Correct { next: None }),
            }
        } else {
            Ok(GlobalOutcome::Wrong {
                correct: current.back().to_owned(),
            })
        }
    }
}
