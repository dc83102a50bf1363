use std::sync::Arc;

use orfo_core::Clock;
use orfo_core::TokenMap;
use orfo_core::model::{
    Category, Question, QuestionDraft, QuestionError, UserId, natural_sort,
};
use storage::repository::{CategoryRepository, LedgerRepository, PoolRepository, StorageError};

use crate::error::CatalogError;
use crate::mistakes::{Page, paginate};
use crate::session::Session;
use crate::store::SessionStore;

//
// ─── FLOW STATE ────────────────────────────────────────────────────────────────
//

/// A token-addressed pick-list line: the token goes on the button, the text
/// stays here for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenItem {
    pub token: String,
    pub text: String,
}

/// Edit flow: search results addressed by token, then a chosen pair awaiting
/// its replacement input.
#[derive(Debug, Clone)]
pub struct EditFlow {
    category: String,
    tokens: TokenMap,
    matches: Vec<Question>,
    items: Vec<TokenItem>,
    page: usize,
    chosen: Option<String>,
}

/// What a delete flow is picking from.
#[derive(Debug, Clone)]
enum DeleteScope {
    Categories,
    Questions { category: String },
}

/// Delete flow: a token pick-list plus, once picked, the target awaiting
/// explicit confirmation.
#[derive(Debug, Clone)]
pub struct DeleteFlow {
    scope: DeleteScope,
    tokens: TokenMap,
    items: Vec<TokenItem>,
    page: usize,
    pending: Option<DeleteTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    Question { category: String, pair: String },
    Category { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(DeleteTarget),
    Cancelled,
}

/// Result of a bulk add: validated questions went in, the rest report why
/// they were rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    pub added: Vec<Question>,
    pub rejected: Vec<QuestionError>,
}

fn token_items(tokens: &mut TokenMap, texts: impl IntoIterator<Item = String>) -> Vec<TokenItem> {
    texts
        .into_iter()
        .map(|text| TokenItem {
            token: tokens.insert(&text),
            text,
        })
        .collect()
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Category and question management: creation, single and bulk adds with
/// contributor mirroring, search, token-addressed edits that keep ledger
/// counts, and confirmed deletes that prune ledger state.
#[derive(Clone)]
pub struct CatalogService {
    clock: Clock,
    categories: Arc<dyn CategoryRepository>,
    ledger: Arc<dyn LedgerRepository>,
    pool: Arc<dyn PoolRepository>,
    sessions: SessionStore,
}

impl CatalogService {
    #[must_use]
    pub fn new(
        clock: Clock,
        categories: Arc<dyn CategoryRepository>,
        ledger: Arc<dyn LedgerRepository>,
        pool: Arc<dyn PoolRepository>,
        sessions: SessionStore,
    ) -> Self {
        Self {
            clock,
            categories,
            ledger,
            pool,
            sessions,
        }
    }

    /// The user's categories in natural display order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` on repository failures.
    pub async fn category_names(&self, user: &UserId) -> Result<Vec<String>, CatalogError> {
        let mut names = self.categories.category_names(user).await?;
        natural_sort(&mut names);
        Ok(names)
    }

    /// Creates a category after validating the name. Returns the normalized
    /// name.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Category` for an invalid name and
    /// `CatalogError::DuplicateCategory` when it is already taken; nothing is
    /// mutated in either case.
    pub async fn create_category(
        &self,
        user: &UserId,
        name: &str,
    ) -> Result<String, CatalogError> {
        let name = Category::validate_name(name)?;
        match self.categories.create_category(user, &name).await {
            Ok(()) => Ok(name),
            Err(StorageError::Conflict) => Err(CatalogError::DuplicateCategory(name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Validates a two-line input and appends it to the category. Additions
    /// by allow-listed contributors are mirrored into the shared pool.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Question` for invalid input (nothing mutated)
    /// and `CatalogError::UnknownCategory` for a missing category.
    pub async fn add_question(
        &self,
        user: &UserId,
        category: &str,
        input: &str,
    ) -> Result<Question, CatalogError> {
        let question = QuestionDraft::parse(input)?.validate()?;
        self.add_validated(user, category, &question).await?;
        Ok(question)
    }

    async fn add_validated(
        &self,
        user: &UserId,
        category: &str,
        question: &Question,
    ) -> Result<(), CatalogError> {
        match self.categories.add_question(user, category, question).await {
            Ok(()) => {}
            Err(StorageError::NotFound) => {
                return Err(CatalogError::UnknownCategory(category.to_owned()));
            }
            Err(e) => return Err(e.into()),
        }
        if self.pool.is_contributor(user).await? {
            self.pool.add_to_pool(category, question).await?;
        }
        Ok(())
    }

    /// Adds several questions at once: blank-line-separated two-line blocks.
    /// Invalid blocks are skipped and reported, valid ones still go in.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownCategory` for a missing category.
    pub async fn add_questions_bulk(
        &self,
        user: &UserId,
        category: &str,
        input: &str,
    ) -> Result<BulkOutcome, CatalogError> {
        let mut outcome = BulkOutcome {
            added: Vec::new(),
            rejected: Vec::new(),
        };
        for block in input.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
            match QuestionDraft::parse(block).and_then(QuestionDraft::validate) {
                Ok(question) => {
                    self.add_validated(user, category, &question).await?;
                    outcome.added.push(question);
                }
                Err(e) => outcome.rejected.push(e),
            }
        }
        Ok(outcome)
    }

    /// Case-insensitive substring search over a category's pair text.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownCategory` for a missing category.
    pub async fn search(
        &self,
        user: &UserId,
        category: &str,
        query: &str,
    ) -> Result<Vec<Question>, CatalogError> {
        let found = self
            .categories
            .get_category(user, category)
            .await?
            .ok_or_else(|| CatalogError::UnknownCategory(category.to_owned()))?;
        let needle = query.trim().to_lowercase();
        Ok(found
            .questions()
            .iter()
            .filter(|q| q.pair_key().to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    //
    // ─── EDIT FLOW ─────────────────────────────────────────────────────────────
    //

    /// Searches a category and opens a token-addressed pick list for
    /// editing, superseding any prior session.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NoMatches` when the search finds nothing; no
    /// session is created then.
    pub async fn begin_edit(
        &self,
        user: &UserId,
        category: &str,
        query: &str,
    ) -> Result<Page<TokenItem>, CatalogError> {
        let matches = self.search(user, category, query).await?;
        if matches.is_empty() {
            return Err(CatalogError::NoMatches);
        }

        let _gate = self.sessions.guard(user).await;
        let mut tokens = TokenMap::new();
        let items = token_items(&mut tokens, matches.iter().map(Question::pair_key));
        let page = paginate(&items, 0);
        let flow = EditFlow {
            category: category.to_owned(),
            tokens,
            matches,
            items,
            page: 0,
            chosen: None,
        };
        self.sessions
            .set(user, Session::EditFlow(flow), self.clock.now());
        Ok(page)
    }

    /// Resolves a picked token and marks that question as awaiting its
    /// replacement. Returns the current question.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Stale` when the flow or the token is no longer
    /// valid; the user is sent back to the menu.
    pub async fn choose_edit(&self, user: &UserId, token: &str) -> Result<Question, CatalogError> {
        let _gate = self.sessions.guard(user).await;
        let stored = self.sessions.take(user).ok_or(CatalogError::Stale)?;
        let mut flow = match stored.session {
            Session::EditFlow(flow) => flow,
            other => {
                self.sessions.put_back(user, other, stored.stored_at);
                return Err(CatalogError::Stale);
            }
        };

        let Some(pair) = flow.tokens.resolve(token).map(str::to_owned) else {
            self.sessions
                .put_back(user, Session::EditFlow(flow), stored.stored_at);
            return Err(CatalogError::Stale);
        };
        let Some(question) = flow.matches.iter().find(|q| q.pair_key() == pair).cloned() else {
            self.sessions
                .put_back(user, Session::EditFlow(flow), stored.stored_at);
            return Err(CatalogError::Stale);
        };

        flow.chosen = Some(pair);
        self.sessions
            .put_back(user, Session::EditFlow(flow), stored.stored_at);
        Ok(question)
    }

    /// Replaces the chosen question with a validated two-line input and
    /// renames its ledger entry so the count survives. Destroys the flow.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Question` for invalid input — the flow is kept
    /// and the input re-requested — and `CatalogError::Stale` when the flow
    /// is gone or nothing was chosen.
    pub async fn apply_edit(&self, user: &UserId, input: &str) -> Result<Question, CatalogError> {
        let _gate = self.sessions.guard(user).await;
        let stored = self.sessions.take(user).ok_or(CatalogError::Stale)?;
        let flow = match stored.session {
            Session::EditFlow(flow) => flow,
            other => {
                self.sessions.put_back(user, other, stored.stored_at);
                return Err(CatalogError::Stale);
            }
        };
        let Some(old_pair) = flow.chosen.clone() else {
            self.sessions
                .put_back(user, Session::EditFlow(flow), stored.stored_at);
            return Err(CatalogError::Stale);
        };

        let question = match QuestionDraft::parse(input).and_then(QuestionDraft::validate) {
            Ok(question) => question,
            Err(e) => {
                // Recoverable: keep the flow so the user can retry.
                self.sessions
                    .put_back(user, Session::EditFlow(flow), stored.stored_at);
                return Err(e.into());
            }
        };

        match self
            .categories
            .replace_question(user, &flow.category, &old_pair, &question)
            .await
        {
            Ok(()) => {}
            Err(StorageError::NotFound) => return Err(CatalogError::Stale),
            Err(e) => return Err(e.into()),
        }
        self.ledger
            .rename_entry(user, &flow.category, &old_pair, &question.pair_key())
            .await?;
        Ok(question)
    }

    //
    // ─── DELETE FLOWS ──────────────────────────────────────────────────────────
    //

    /// Opens a token-addressed pick list over the user's categories for
    /// deletion.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NoCategories` when there is nothing to delete.
    pub async fn begin_delete_category(
        &self,
        user: &UserId,
    ) -> Result<Page<TokenItem>, CatalogError> {
        let names = self.category_names(user).await?;
        if names.is_empty() {
            return Err(CatalogError::NoCategories);
        }

        let _gate = self.sessions.guard(user).await;
        let mut tokens = TokenMap::new();
        let items = token_items(&mut tokens, names);
        let page = paginate(&items, 0);
        let flow = DeleteFlow {
            scope: DeleteScope::Categories,
            tokens,
            items,
            page: 0,
            pending: None,
        };
        self.sessions
            .set(user, Session::DeleteFlow(flow), self.clock.now());
        Ok(page)
    }

    /// Searches a category and opens a token-addressed pick list over the
    /// matches for deletion.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NoMatches` when the search finds nothing.
    pub async fn begin_delete_question(
        &self,
        user: &UserId,
        category: &str,
        query: &str,
    ) -> Result<Page<TokenItem>, CatalogError> {
        let matches = self.search(user, category, query).await?;
        if matches.is_empty() {
            return Err(CatalogError::NoMatches);
        }

        let _gate = self.sessions.guard(user).await;
        let mut tokens = TokenMap::new();
        let items = token_items(&mut tokens, matches.iter().map(Question::pair_key));
        let page = paginate(&items, 0);
        let flow = DeleteFlow {
            scope: DeleteScope::Questions {
                category: category.to_owned(),
            },
            tokens,
            items,
            page: 0,
            pending: None,
        };
        self.sessions
            .set(user, Session::DeleteFlow(flow), self.clock.now());
        Ok(page)
    }

    /// Resolves a picked token into the target awaiting confirmation.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Stale` when the flow or the token is no longer
    /// valid.
    pub async fn request_delete(
        &self,
        user: &UserId,
        token: &str,
    ) -> Result<DeleteTarget, CatalogError> {
        let _gate = self.sessions.guard(user).await;
        let stored = self.sessions.take(user).ok_or(CatalogError::Stale)?;
        let mut flow = match stored.session {
            Session::DeleteFlow(flow) => flow,
            other => {
                self.sessions.put_back(user, other, stored.stored_at);
                return Err(CatalogError::Stale);
            }
        };

        let Some(text) = flow.tokens.resolve(token).map(str::to_owned) else {
            self.sessions
                .put_back(user, Session::DeleteFlow(flow), stored.stored_at);
            return Err(CatalogError::Stale);
        };
        let target = match &flow.scope {
            DeleteScope::Categories => DeleteTarget::Category { name: text },
            DeleteScope::Questions { category } => DeleteTarget::Question {
                category: category.clone(),
                pair: text,
            },
        };
        flow.pending = Some(target.clone());
        self.sessions
            .put_back(user, Session::DeleteFlow(flow), stored.stored_at);
        Ok(target)
    }

    /// Executes or cancels the pending delete: literal `"1"` confirms,
    /// literal `"0"` cancels. The flow ends on either; any other input keeps
    /// it and asks again.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::InvalidConfirmation` for other input and
    /// `CatalogError::Stale` when nothing is pending.
    pub async fn confirm_delete(
        &self,
        user: &UserId,
        input: &str,
    ) -> Result<DeleteOutcome, CatalogError> {
        let _gate = self.sessions.guard(user).await;
        let stored = self.sessions.take(user).ok_or(CatalogError::Stale)?;
        let flow = match stored.session {
            Session::DeleteFlow(flow) => flow,
            other => {
                self.sessions.put_back(user, other, stored.stored_at);
                return Err(CatalogError::Stale);
            }
        };
        let Some(target) = flow.pending.clone() else {
            self.sessions
                .put_back(user, Session::DeleteFlow(flow), stored.stored_at);
            return Err(CatalogError::Stale);
        };

        match input.trim() {
            "1" => {
                self.execute_delete(user, &target).await?;
                Ok(DeleteOutcome::Deleted(target))
            }
            "0" => Ok(DeleteOutcome::Cancelled),
            _ => {
                self.sessions
                    .put_back(user, Session::DeleteFlow(flow), stored.stored_at);
                Err(CatalogError::InvalidConfirmation)
            }
        }
    }

    async fn execute_delete(
        &self,
        user: &UserId,
        target: &DeleteTarget,
    ) -> Result<(), CatalogError> {
        match target {
            DeleteTarget::Question { category, pair } => {
                match self.categories.remove_question(user, category, pair).await {
                    Ok(()) => {}
                    Err(StorageError::NotFound) => return Err(CatalogError::Stale),
                    Err(e) => return Err(e.into()),
                }
                match self.ledger.remove_entry(user, category, pair).await {
                    Ok(()) | Err(StorageError::NotFound) => {}
                    Err(e) => return Err(e.into()),
                }
                // Deleting the last question removes the category itself.
                if self.categories.question_count(user, category).await? == 0 {
                    match self.categories.delete_category(user, category).await {
                        Ok(()) | Err(StorageError::NotFound) => {}
                        Err(e) => return Err(e.into()),
                    }
                    self.ledger.clear_category(user, category).await?;
                }
            }
            DeleteTarget::Category { name } => {
                match self.categories.delete_category(user, name).await {
                    Ok(()) => {}
                    Err(StorageError::NotFound) => return Err(CatalogError::Stale),
                    Err(e) => return Err(e.into()),
                }
                self.ledger.clear_category(user, name).await?;
            }
        }
        Ok(())
    }

    //
    // ─── PICK-LIST PAGING ──────────────────────────────────────────────────────
    //

    /// Next page of the open edit or delete pick list.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Stale` when no pick list is open.
    pub async fn flow_next_page(&self, user: &UserId) -> Result<Page<TokenItem>, CatalogError> {
        self.flow_turn(user, true).await
    }

    /// Previous page of the open edit or delete pick list.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Stale` when no pick list is open.
    pub async fn flow_prev_page(&self, user: &UserId) -> Result<Page<TokenItem>, CatalogError> {
        self.flow_turn(user, false).await
    }

    async fn flow_turn(
        &self,
        user: &UserId,
        forward: bool,
    ) -> Result<Page<TokenItem>, CatalogError> {
        fn turn(items: &[TokenItem], page: &mut usize, forward: bool) -> Page<TokenItem> {
            let current = paginate(items, *page);
            if forward && current.has_next {
                *page += 1;
            } else if !forward && current.has_prev {
                *page -= 1;
            }
            paginate(items, *page)
        }

        let _gate = self.sessions.guard(user).await;
        let stored = self.sessions.take(user).ok_or(CatalogError::Stale)?;
        match stored.session {
            Session::EditFlow(mut flow) => {
                let page = turn(&flow.items, &mut flow.page, forward);
                self.sessions
                    .put_back(user, Session::EditFlow(flow), stored.stored_at);
                Ok(page)
            }
            Session::DeleteFlow(mut flow) => {
                let page = turn(&flow.items, &mut flow.page, forward);
                self.sessions
                    .put_back(user, Session::DeleteFlow(flow), stored.stored_at);
                Ok(page)
            }
            other => {
                self.sessions.put_back(user, other, stored.stored_at);
                Err(CatalogError::Stale)
            }
        }
    }

    /// Abandons any open edit/delete flow. Returns whether one existed.
    pub async fn cancel_flow(&self, user: &UserId) -> bool {
        let _gate = self.sessions.guard(user).await;
        self.sessions.clear(user)
    }
}
