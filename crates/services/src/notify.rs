use async_trait::async_trait;
use thiserror::Error;

use orfo_core::model::UserId;

use crate::reminder::ReminderAsk;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound delivery seam for scheduler-initiated prompts.
///
/// Interactive flows return their results to the caller; only the reminder
/// scheduler has no caller to return to, so it pushes through this trait.
/// Failures are non-fatal: the caller logs them and the session state stays
/// as written.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers a reminder prompt to the user's transport.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError` when the transport rejects the delivery.
    async fn deliver(&self, user: &UserId, ask: &ReminderAsk) -> Result<(), NotifyError>;
}

/// Discards every delivery. Useful as a default and in tests that only care
/// about state.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn deliver(&self, _user: &UserId, _ask: &ReminderAsk) -> Result<(), NotifyError> {
        Ok(())
    }
}
