use std::fmt;

use crate::catalog::{DeleteFlow, EditFlow};
use crate::global::GlobalGame;
use crate::mistakes::MistakeBrowser;
use crate::quiz::QuizSession;
use crate::reminder::ReminderAsk;

/// The single interaction a user may be in at any instant.
///
/// One variant per mode, each carrying only its own typed state; starting
/// any new interaction replaces the whole value.
#[derive(Debug, Clone)]
pub enum Session {
    Quiz(QuizSession),
    GlobalGame(GlobalGame),
    ReminderQuiz(ReminderAsk),
    EditFlow(EditFlow),
    DeleteFlow(DeleteFlow),
    Browse(MistakeBrowser),
    /// A finished interaction still holding surface state open; ages out via
    /// the sweep.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Quiz,
    GlobalGame,
    ReminderQuiz,
    EditFlow,
    DeleteFlow,
    Browse,
    Idle,
}

impl Session {
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        match self {
            Session::Quiz(_) => SessionMode::Quiz,
            Session::GlobalGame(_) => SessionMode::GlobalGame,
            Session::ReminderQuiz(_) => SessionMode::ReminderQuiz,
            Session::EditFlow(_) => SessionMode::EditFlow,
            Session::DeleteFlow(_) => SessionMode::DeleteFlow,
            Session::Browse(_) => SessionMode::Browse,
            Session::Idle => SessionMode::Idle,
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionMode::Quiz => "quiz",
            SessionMode::GlobalGame => "global_game",
            SessionMode::ReminderQuiz => "reminder_quiz",
            SessionMode::EditFlow => "edit_flow",
            SessionMode::DeleteFlow => "delete_flow",
            SessionMode::Browse => "browse_flow",
            SessionMode::Idle => "idle",
        };
        write!(f, "{name}")
    }
}

/// A reserved control token: anything the transport routes as a command.
/// Sent during an active prompt it aborts the session without penalty.
#[must_use]
pub fn is_command(input: &str) -> bool {
    input.trim_start().starts_with('/')
}
