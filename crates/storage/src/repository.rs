use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use orfo_core::model::{
    Category, MistakeRecord, Question, ReminderTime, UserId, sort_for_listing,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result of toggling a reminder time: submitting an absent time adds it,
/// submitting a present one removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Per-user categories and their questions. Question order is insertion
/// order; category names are unique per user.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Lists category names for a user, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn category_names(&self, user: &UserId) -> Result<Vec<String>, StorageError>;

    /// Fetches one category with its questions, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_category(
        &self,
        user: &UserId,
        name: &str,
    ) -> Result<Option<Category>, StorageError>;

    /// Creates an empty category.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the name is already taken.
    async fn create_category(&self, user: &UserId, name: &str) -> Result<(), StorageError>;

    /// Appends a question to a category.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the category does not exist.
    async fn add_question(
        &self,
        user: &UserId,
        category: &str,
        question: &Question,
    ) -> Result<(), StorageError>;

    /// Replaces the first question matching `old_pair` with `question`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when nothing matches.
    async fn replace_question(
        &self,
        user: &UserId,
        category: &str,
        old_pair: &str,
        question: &Question,
    ) -> Result<(), StorageError>;

    /// Removes the first question matching `pair`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when nothing matches.
    async fn remove_question(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<(), StorageError>;

    /// Number of questions in a category (0 when the category is absent).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn question_count(&self, user: &UserId, category: &str) -> Result<u32, StorageError>;

    /// Deletes a category and its questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the category does not exist.
    async fn delete_category(&self, user: &UserId, name: &str) -> Result<(), StorageError>;
}

/// The durable mistake ledger. Counts are strictly positive: an operation
/// that would leave a zero count deletes the entry instead, and a category
/// group with no entries does not exist.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Adds one to an entry, creating it at 1. Returns the new count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn increment(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<u32, StorageError>;

    /// Subtracts one, deleting the entry when it reaches zero. Returns the
    /// remaining count (0 means removed; an absent entry also yields 0).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn decrement_or_remove(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<u32, StorageError>;

    /// Overwrites a count; 0 deletes the entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the entry does not exist.
    async fn set_count(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
        count: u32,
    ) -> Result<(), StorageError>;

    /// Deletes one entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the entry does not exist.
    async fn remove_entry(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<(), StorageError>;

    /// Deletes every entry of a category. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn clear_category(&self, user: &UserId, category: &str) -> Result<(), StorageError>;

    /// Moves an entry to a new pair key, carrying the count across a
    /// question edit. An existing entry under the new key is overwritten;
    /// renaming an absent entry is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn rename_entry(
        &self,
        user: &UserId,
        category: &str,
        old_pair: &str,
        new_pair: &str,
    ) -> Result<(), StorageError>;

    /// Lists entries, optionally scoped to one category, sorted by
    /// descending count then pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn entries(
        &self,
        user: &UserId,
        category: Option<&str>,
    ) -> Result<Vec<MistakeRecord>, StorageError>;

    /// Category names that currently hold at least one entry, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn categories_with_mistakes(&self, user: &UserId) -> Result<Vec<String>, StorageError>;
}

/// Per-user daily reminder slots.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// All configured times for a user, ascending.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn times(&self, user: &UserId) -> Result<Vec<ReminderTime>, StorageError>;

    /// Adds the time if absent, removes it if present.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn toggle(&self, user: &UserId, at: ReminderTime) -> Result<ToggleOutcome, StorageError>;

    /// Users with this exact slot configured.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn users_at(&self, at: ReminderTime) -> Result<Vec<UserId>, StorageError>;
}

/// The cross-user shared pool and its contributor allow-list.
#[async_trait]
pub trait PoolRepository: Send + Sync {
    /// Whether this user's additions are mirrored into the shared pool.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn is_contributor(&self, user: &UserId) -> Result<bool, StorageError>;

    /// Adds a user to the allow-list. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn add_contributor(&self, user: &UserId) -> Result<(), StorageError>;

    /// Appends a question to the shared pool under a category label.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn add_to_pool(&self, category: &str, question: &Question) -> Result<(), StorageError>;

    /// Every pooled question across all categories, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn pool_questions(&self) -> Result<Vec<Question>, StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

type CategoryMap = HashMap<UserId, Vec<(String, Vec<Question>)>>;
type LedgerMap = HashMap<UserId, BTreeMap<String, BTreeMap<String, u32>>>;

/// Map-backed implementation of every repository, for tests and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    categories: Arc<Mutex<CategoryMap>>,
    ledger: Arc<Mutex<LedgerMap>>,
    schedule: Arc<Mutex<HashMap<UserId, BTreeSet<ReminderTime>>>>,
    contributors: Arc<Mutex<HashSet<UserId>>>,
    pool: Arc<Mutex<Vec<(String, Question)>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<'a, T>(m: &'a Mutex<T>) -> Result<std::sync::MutexGuard<'a, T>, StorageError> {
        m.lock().map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CategoryRepository for InMemoryStore {
    async fn category_names(&self, user: &UserId) -> Result<Vec<String>, StorageError> {
        let guard = Self::lock(&self.categories)?;
        let mut names: Vec<String> = guard
            .get(user)
            .map(|cats| cats.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn get_category(
        &self,
        user: &UserId,
        name: &str,
    ) -> Result<Option<Category>, StorageError> {
        let guard = Self::lock(&self.categories)?;
        let Some(found) = guard
            .get(user)
            .and_then(|cats| cats.iter().find(|(n, _)| n == name))
        else {
            return Ok(None);
        };
        Category::new(found.0.clone(), found.1.clone())
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn create_category(&self, user: &UserId, name: &str) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.categories)?;
        let cats = guard.entry(user.clone()).or_default();
        if cats.iter().any(|(n, _)| n == name) {
            return Err(StorageError::Conflict);
        }
        cats.push((name.to_owned(), Vec::new()));
        Ok(())
    }

    async fn add_question(
        &self,
        user: &UserId,
        category: &str,
        question: &Question,
    ) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.categories)?;
        let cats = guard.get_mut(user).ok_or(StorageError::NotFound)?;
        let slot = cats
            .iter_mut()
            .find(|(n, _)| n == category)
            .ok_or(StorageError::NotFound)?;
        slot.1.push(question.clone());
        Ok(())
    }

    async fn replace_question(
        &self,
        user: &UserId,
        category: &str,
        old_pair: &str,
        question: &Question,
    ) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.categories)?;
        let cats = guard.get_mut(user).ok_or(StorageError::NotFound)?;
        let slot = cats
            .iter_mut()
            .find(|(n, _)| n == category)
            .ok_or(StorageError::NotFound)?;
        let found = slot
            .1
            .iter_mut()
            .find(|q| q.pair_key() == old_pair)
            .ok_or(StorageError::NotFound)?;
        *found = question.clone();
        Ok(())
    }

    async fn remove_question(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.categories)?;
        let cats = guard.get_mut(user).ok_or(StorageError::NotFound)?;
        let slot = cats
            .iter_mut()
            .find(|(n, _)| n == category)
            .ok_or(StorageError::NotFound)?;
        let idx = slot
            .1
            .iter()
            .position(|q| q.pair_key() == pair)
            .ok_or(StorageError::NotFound)?;
        slot.1.remove(idx);
        Ok(())
    }

    async fn question_count(&self, user: &UserId, category: &str) -> Result<u32, StorageError> {
        let guard = Self::lock(&self.categories)?;
        let count = guard
            .get(user)
            .and_then(|cats| cats.iter().find(|(n, _)| n == category))
            .map_or(0, |(_, qs)| qs.len());
        u32::try_from(count).map_err(|_| StorageError::Serialization("count overflow".into()))
    }

    async fn delete_category(&self, user: &UserId, name: &str) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.categories)?;
        let cats = guard.get_mut(user).ok_or(StorageError::NotFound)?;
        let idx = cats
            .iter()
            .position(|(n, _)| n == name)
            .ok_or(StorageError::NotFound)?;
        cats.remove(idx);
        Ok(())
    }
}

#[async_trait]
impl LedgerRepository for InMemoryStore {
    async fn increment(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<u32, StorageError> {
        let mut guard = Self::lock(&self.ledger)?;
        let count = guard
            .entry(user.clone())
            .or_default()
            .entry(category.to_owned())
            .or_default()
            .entry(pair.to_owned())
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn decrement_or_remove(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<u32, StorageError> {
        let mut guard = Self::lock(&self.ledger)?;
        let Some(categories) = guard.get_mut(user) else {
            return Ok(0);
        };
        let Some(entries) = categories.get_mut(category) else {
            return Ok(0);
        };
        let remaining = match entries.get(pair).copied() {
            None => 0,
            Some(1) => {
                entries.remove(pair);
                0
            }
            Some(count) => {
                entries.insert(pair.to_owned(), count - 1);
                count - 1
            }
        };
        if entries.is_empty() {
            categories.remove(category);
        }
        Ok(remaining)
    }

    async fn set_count(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
        count: u32,
    ) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.ledger)?;
        let categories = guard.get_mut(user).ok_or(StorageError::NotFound)?;
        let entries = categories.get_mut(category).ok_or(StorageError::NotFound)?;
        if !entries.contains_key(pair) {
            return Err(StorageError::NotFound);
        }
        if count == 0 {
            entries.remove(pair);
        } else {
            entries.insert(pair.to_owned(), count);
        }
        let now_empty = entries.is_empty();
        if now_empty {
            categories.remove(category);
        }
        Ok(())
    }

    async fn remove_entry(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.ledger)?;
        let categories = guard.get_mut(user).ok_or(StorageError::NotFound)?;
        let entries = categories.get_mut(category).ok_or(StorageError::NotFound)?;
        entries.remove(pair).ok_or(StorageError::NotFound)?;
        if entries.is_empty() {
            categories.remove(category);
        }
        Ok(())
    }

    async fn clear_category(&self, user: &UserId, category: &str) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.ledger)?;
        if let Some(categories) = guard.get_mut(user) {
            categories.remove(category);
        }
        Ok(())
    }

    async fn rename_entry(
        &self,
        user: &UserId,
        category: &str,
        old_pair: &str,
        new_pair: &str,
    ) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.ledger)?;
        let Some(entries) = guard
            .get_mut(user)
            .and_then(|categories| categories.get_mut(category))
        else {
            return Ok(());
        };
        if let Some(count) = entries.remove(old_pair) {
            entries.insert(new_pair.to_owned(), count);
        }
        Ok(())
    }

    async fn entries(
        &self,
        user: &UserId,
        category: Option<&str>,
    ) -> Result<Vec<MistakeRecord>, StorageError> {
        let guard = Self::lock(&self.ledger)?;
        let mut records = Vec::new();
        if let Some(categories) = guard.get(user) {
            for (name, entries) in categories {
                if category.is_some_and(|wanted| wanted != name.as_str()) {
                    continue;
                }
                for (pair, count) in entries {
                    records.push(MistakeRecord {
                        category: name.clone(),
                        pair: pair.clone(),
                        count: *count,
                    });
                }
            }
        }
        sort_for_listing(&mut records);
        Ok(records)
    }

    async fn categories_with_mistakes(&self, user: &UserId) -> Result<Vec<String>, StorageError> {
        let guard = Self::lock(&self.ledger)?;
        Ok(guard
            .get(user)
            .map(|categories| categories.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryStore {
    async fn times(&self, user: &UserId) -> Result<Vec<ReminderTime>, StorageError> {
        let guard = Self::lock(&self.schedule)?;
        Ok(guard
            .get(user)
            .map(|times| times.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn toggle(&self, user: &UserId, at: ReminderTime) -> Result<ToggleOutcome, StorageError> {
        let mut guard = Self::lock(&self.schedule)?;
        let times = guard.entry(user.clone()).or_default();
        if times.remove(&at) {
            if times.is_empty() {
                guard.remove(user);
            }
            Ok(ToggleOutcome::Removed)
        } else {
            times.insert(at);
            Ok(ToggleOutcome::Added)
        }
    }

    async fn users_at(&self, at: ReminderTime) -> Result<Vec<UserId>, StorageError> {
        let guard = Self::lock(&self.schedule)?;
        let mut users: Vec<UserId> = guard
            .iter()
            .filter(|(_, times)| times.contains(&at))
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        Ok(users)
    }
}

#[async_trait]
impl PoolRepository for InMemoryStore {
    async fn is_contributor(&self, user: &UserId) -> Result<bool, StorageError> {
        let guard = Self::lock(&self.contributors)?;
        Ok(guard.contains(user))
    }

    async fn add_contributor(&self, user: &UserId) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.contributors)?;
        guard.insert(user.clone());
        Ok(())
    }

    async fn add_to_pool(&self, category: &str, question: &Question) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.pool)?;
        guard.push((category.to_owned(), question.clone()));
        Ok(())
    }

    async fn pool_questions(&self) -> Result<Vec<Question>, StorageError> {
        let guard = Self::lock(&self.pool)?;
        Ok(guard.iter().map(|(_, q)| q.clone()).collect())
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the four repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub categories: Arc<dyn CategoryRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub schedule: Arc<dyn ScheduleRepository>,
    pub pool: Arc<dyn PoolRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let store = InMemoryStore::new();
        Self {
            categories: Arc::new(store.clone()),
            ledger: Arc::new(store.clone()),
            schedule: Arc::new(store.clone()),
            pool: Arc::new(store),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn question(front: &str, back: &str) -> Question {
        Question::new(front, back).unwrap()
    }

    #[tokio::test]
    async fn category_round_trip_preserves_order() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        store.create_category(&user, "Unit 1").await.unwrap();
        store
            .add_question(&user, "Unit 1", &question("cat", "felis"))
            .await
            .unwrap();
        store
            .add_question(&user, "Unit 1", &question("dog", "canis"))
            .await
            .unwrap();

        let cat = store.get_category(&user, "Unit 1").await.unwrap().unwrap();
        assert_eq!(cat.len(), 2);
        assert_eq!(cat.questions()[0].front(), "cat");
        assert_eq!(cat.questions()[1].front(), "dog");
    }

    #[tokio::test]
    async fn duplicate_category_conflicts() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        store.create_category(&user, "A").await.unwrap();
        let err = store.create_category(&user, "A").await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn increment_creates_at_one_and_decrement_removes_at_zero() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        assert_eq!(store.increment(&user, "A", "cat←felis").await.unwrap(), 1);
        assert_eq!(store.increment(&user, "A", "cat←felis").await.unwrap(), 2);
        assert_eq!(
            store
                .decrement_or_remove(&user, "A", "cat←felis")
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .decrement_or_remove(&user, "A", "cat←felis")
                .await
                .unwrap(),
            0
        );
        assert!(store.entries(&user, None).await.unwrap().is_empty());
        // The empty category group is gone too.
        assert!(
            store
                .categories_with_mistakes(&user)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn rename_preserves_count() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        store.increment(&user, "A", "cot←cat").await.unwrap();
        store.increment(&user, "A", "cot←cat").await.unwrap();
        store
            .rename_entry(&user, "A", "cot←cat", "kot←cat")
            .await
            .unwrap();

        let entries = store.entries(&user, Some("A")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pair, "kot←cat");
        assert_eq!(entries[0].count, 2);
    }

    #[tokio::test]
    async fn entries_sorted_desc_count_then_pair() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        for _ in 0..3 {
            store.increment(&user, "A", "b←y").await.unwrap();
        }
        store.increment(&user, "A", "a←x").await.unwrap();
        store.increment(&user, "B", "c←z").await.unwrap();

        let entries = store.entries(&user, None).await.unwrap();
        let pairs: Vec<&str> = entries.iter().map(|r| r.pair.as_str()).collect();
        assert_eq!(pairs, vec!["b←y", "a←x", "c←z"]);
    }

    #[tokio::test]
    async fn toggle_twice_leaves_schedule_empty() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        let at: ReminderTime = "08:00".parse().unwrap();
        assert_eq!(store.toggle(&user, at).await.unwrap(), ToggleOutcome::Added);
        assert_eq!(
            store.toggle(&user, at).await.unwrap(),
            ToggleOutcome::Removed
        );
        assert!(store.times(&user).await.unwrap().is_empty());
        assert!(store.users_at(at).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pool_mirrors_only_for_contributors() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        assert!(!store.is_contributor(&user).await.unwrap());
        store.add_contributor(&user).await.unwrap();
        assert!(store.is_contributor(&user).await.unwrap());

        store
            .add_to_pool("A", &question("cat", "felis"))
            .await
            .unwrap();
        assert_eq!(store.pool_questions().await.unwrap().len(), 1);
    }
}
