use std::sync::Arc;

use orfo_core::Clock;
use orfo_core::model::{MistakeRecord, UserId, natural_sort};
use storage::repository::{LedgerRepository, StorageError};

use crate::error::MistakeError;
use crate::session::Session;
use crate::store::SessionStore;

/// Items per listing page.
pub const PAGE_SIZE: usize = 10;

//
// ─── PAGINATION ────────────────────────────────────────────────────────────────
//

/// One page of a listing. `has_prev`/`has_next` are set only when a further
/// page actually exists, which is exactly when the surface shows the
/// matching control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

pub(crate) fn paginate<T: Clone>(items: &[T], number: usize) -> Page<T> {
    let total_items = items.len();
    let total_pages = if total_items == 0 {
        1
    } else {
        (total_items - 1) / PAGE_SIZE + 1
    };
    let number = number.min(total_pages - 1);
    let start = number * PAGE_SIZE;
    let end = (start + PAGE_SIZE).min(total_items);
    Page {
        items: items[start..end].to_vec(),
        number,
        total_pages,
        total_items,
        has_prev: number > 0,
        has_next: end < total_items,
    }
}

//
// ─── BROWSER ───────────────────────────────────────────────────────────────────
//

/// One listing line: the correct variant, with its mistake count when the
/// listing came from the ledger (a completion report has no counts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseEntry {
    pub text: String,
    pub count: Option<u32>,
}

/// Read-only paginated listing held in the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MistakeBrowser {
    entries: Vec<BrowseEntry>,
    page: usize,
}

impl MistakeBrowser {
    #[must_use]
    pub fn from_records(records: &[MistakeRecord]) -> Self {
        let entries = records
            .iter()
            .map(|record| BrowseEntry {
                text: record.correct_part().to_owned(),
                count: Some(record.count),
            })
            .collect();
        Self { entries, page: 0 }
    }

    /// Listing over a quiz completion report's missed answers.
    #[must_use]
    pub fn from_answers(answers: Vec<String>) -> Self {
        let entries = answers
            .into_iter()
            .map(|text| BrowseEntry { text, count: None })
            .collect();
        Self { entries, page: 0 }
    }

    #[must_use]
    pub fn page(&self) -> Page<BrowseEntry> {
        paginate(&self.entries, self.page)
    }

    fn turn(&mut self, forward: bool) -> Page<BrowseEntry> {
        let current = self.page();
        if forward && current.has_next {
            self.page += 1;
        } else if !forward && current.has_prev {
            self.page -= 1;
        }
        self.page()
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Outcome of a manual count adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustOutcome {
    Removed,
    Lowered { count: u32 },
}

/// Paginated mistake browsing plus ledger maintenance.
#[derive(Clone)]
pub struct MistakeService {
    clock: Clock,
    ledger: Arc<dyn LedgerRepository>,
    sessions: SessionStore,
}

impl MistakeService {
    #[must_use]
    pub fn new(clock: Clock, ledger: Arc<dyn LedgerRepository>, sessions: SessionStore) -> Self {
        Self {
            clock,
            ledger,
            sessions,
        }
    }

    /// Categories that currently hold mistakes, in natural display order.
    ///
    /// # Errors
    ///
    /// Returns `MistakeError::Storage` on repository failures.
    pub async fn categories(&self, user: &UserId) -> Result<Vec<String>, MistakeError> {
        let mut names = self.ledger.categories_with_mistakes(user).await?;
        natural_sort(&mut names);
        Ok(names)
    }

    /// Opens a paginated listing of one category's mistakes, superseding any
    /// prior session.
    ///
    /// # Errors
    ///
    /// Returns `MistakeError::NoMistakes` when the category has none; no
    /// session is created then.
    pub async fn open(
        &self,
        user: &UserId,
        category: &str,
    ) -> Result<Page<BrowseEntry>, MistakeError> {
        let _gate = self.sessions.guard(user).await;
        let records = self.ledger.entries(user, Some(category)).await?;
        if records.is_empty() {
            return Err(MistakeError::NoMistakes);
        }
        let browser = MistakeBrowser::from_records(&records);
        let page = browser.page();
        self.sessions
            .set(user, Session::Browse(browser), self.clock.now());
        Ok(page)
    }

    /// Turns to the next page of the open listing.
    ///
    /// # Errors
    ///
    /// Returns `MistakeError::Stale` when no listing is open.
    pub async fn next_page(&self, user: &UserId) -> Result<Page<BrowseEntry>, MistakeError> {
        self.turn(user, true).await
    }

    /// Turns to the previous page of the open listing.
    ///
    /// # Errors
    ///
    /// Returns `MistakeError::Stale` when no listing is open.
    pub async fn prev_page(&self, user: &UserId) -> Result<Page<BrowseEntry>, MistakeError> {
        self.turn(user, false).await
    }

    async fn turn(&self, user: &UserId, forward: bool) -> Result<Page<BrowseEntry>, MistakeError> {
        let _gate = self.sessions.guard(user).await;
        let stored = self.sessions.take(user).ok_or(MistakeError::Stale)?;
        let mut browser = match stored.session {
            Session::Browse(browser) => browser,
            other => {
                self.sessions.put_back(user, other, stored.stored_at);
                return Err(MistakeError::Stale);
            }
        };
        let page = browser.turn(forward);
        self.sessions
            .put_back(user, Session::Browse(browser), stored.stored_at);
        Ok(page)
    }

    /// Tears down the open listing. Returns whether one existed.
    pub async fn close(&self, user: &UserId) -> bool {
        let _gate = self.sessions.guard(user).await;
        self.sessions.clear(user)
    }

    /// Deletes one ledger entry.
    ///
    /// # Errors
    ///
    /// Returns `MistakeError::UnknownEntry` when it does not exist.
    pub async fn remove_entry(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<(), MistakeError> {
        match self.ledger.remove_entry(user, category, pair).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => Err(MistakeError::UnknownEntry),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes every entry of a category.
    ///
    /// # Errors
    ///
    /// Returns `MistakeError::Storage` on repository failures.
    pub async fn clear_category(&self, user: &UserId, category: &str) -> Result<(), MistakeError> {
        Ok(self.ledger.clear_category(user, category).await?)
    }

    /// Manually adjusts a count: 0 removes the entry, anything else must be
    /// strictly lower than the current value.
    ///
    /// # Errors
    ///
    /// Returns `MistakeError::UnknownEntry` for an absent entry and
    /// `MistakeError::NotLower` when the new value does not lower the count.
    pub async fn adjust_count(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
        new_count: u32,
    ) -> Result<AdjustOutcome, MistakeError> {
        let entries = self.ledger.entries(user, Some(category)).await?;
        let current = entries
            .iter()
            .find(|record| record.pair == pair)
            .map(|record| record.count)
            .ok_or(MistakeError::UnknownEntry)?;

        if new_count == 0 {
            self.remove_entry(user, category, pair).await?;
            return Ok(AdjustOutcome::Removed);
        }
        if new_count >= current {
            return Err(MistakeError::NotLower { current });
        }
        self.ledger.set_count(user, category, pair, new_count).await?;
        Ok(AdjustOutcome::Lowered { count: new_count })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
