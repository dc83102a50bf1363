use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::debug;

use orfo_core::Clock;
use orfo_core::model::UserId;

use crate::session::Session;

/// Sessions older than this are discarded by the sweep, whatever their mode.
pub const SESSION_TTL_SECS: i64 = 300;

/// How often the background sweep runs.
pub const SWEEP_PERIOD_SECS: u64 = 60;

/// A stored session plus the stamp the sweep ages it by. The stamp is set on
/// every write, so an actively-driven session survives while an abandoned
/// one times out.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub session: Session,
    pub stored_at: DateTime<Utc>,
}

struct Inner {
    sessions: Mutex<HashMap<UserId, StoredSession>>,
    gates: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
    ttl: Duration,
}

/// Per-user session registry: at most one session per user, unconditional
/// replacement, periodic TTL sweep.
///
/// `guard` hands out a per-user async mutex that serializes the interactive
/// path against the scheduler tick for the same user — the one-queue-per-user
/// shape, without an actual queue.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                gates: Mutex::new(HashMap::new()),
                ttl,
            }),
        }
    }

    #[must_use]
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::seconds(SESSION_TTL_SECS))
    }

    /// Acquires the user's mutation gate. Hold it across a whole
    /// take-mutate-put sequence; drop it before returning to the caller.
    pub async fn guard(&self, user: &UserId) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = lock(&self.inner.gates);
            Arc::clone(
                gates
                    .entry(user.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        gate.lock_owned().await
    }

    #[must_use]
    pub fn get(&self, user: &UserId) -> Option<Session> {
        lock(&self.inner.sessions)
            .get(user)
            .map(|stored| stored.session.clone())
    }

    /// Stores a session, unconditionally replacing any existing one.
    pub fn set(&self, user: &UserId, session: Session, now: DateTime<Utc>) {
        lock(&self.inner.sessions).insert(
            user.clone(),
            StoredSession {
                session,
                stored_at: now,
            },
        );
    }

    /// Removes and returns the user's session for in-place mutation.
    pub fn take(&self, user: &UserId) -> Option<StoredSession> {
        lock(&self.inner.sessions).remove(user)
    }

    /// Returns a taken session, keeping its original stamp.
    pub fn put_back(&self, user: &UserId, session: Session, stored_at: DateTime<Utc>) {
        lock(&self.inner.sessions).insert(user.clone(), StoredSession { session, stored_at });
    }

    /// Drops the user's session. Returns whether one existed.
    pub fn clear(&self, user: &UserId) -> bool {
        lock(&self.inner.sessions).remove(user).is_some()
    }

    /// Removes every session older than the TTL, regardless of mode, and
    /// prunes gates nobody holds. Returns how many sessions were dropped.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let removed = {
            let mut sessions = lock(&self.inner.sessions);
            let before = sessions.len();
            sessions.retain(|_, stored| now - stored.stored_at <= self.inner.ttl);
            before - sessions.len()
        };
        {
            let sessions = lock(&self.inner.sessions);
            let mut gates = lock(&self.inner.gates);
            gates.retain(|user, gate| {
                sessions.contains_key(user) || Arc::strong_count(gate) > 1
            });
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.sessions).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.inner.sessions).is_empty()
    }
}

/// Spawns the periodic TTL sweep.
pub fn spawn_sweeper(store: SessionStore, clock: Clock) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_PERIOD_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let removed = store.sweep(clock.now());
            if removed > 0 {
                debug!(removed, "expired sessions swept");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use orfo_core::fixed_now;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn set_replaces_unconditionally() {
        let store = SessionStore::with_default_ttl();
        let u = user("u1");
        store.set(&u, Session::Idle, fixed_now());
        store.set(&u, Session::Idle, fixed_now());
        assert_eq!(store.len(), 1);
        assert!(store.get(&u).is_some());
        assert!(store.clear(&u));
        assert!(!store.clear(&u));
    }

    #[test]
    fn sweep_removes_only_expired_sessions() {
        let store = SessionStore::with_default_ttl();
        let now = fixed_now();
        store.set(&user("old"), Session::Idle, now);
        store.set(
            &user("fresh"),
            Session::Idle,
            now + Duration::seconds(280),
        );

        let removed = store.sweep(now + Duration::seconds(301));
        assert_eq!(removed, 1);
        assert!(store.get(&user("old")).is_none());
        assert!(store.get(&user("fresh")).is_some());
    }

    #[test]
    fn sweep_at_exact_ttl_keeps_the_session() {
        let store = SessionStore::with_default_ttl();
        let now = fixed_now();
        store.set(&user("u1"), Session::Idle, now);
        assert_eq!(store.sweep(now + Duration::seconds(SESSION_TTL_SECS)), 0);
    }

    #[tokio::test]
    async fn guard_serializes_same_user() {
        let store = SessionStore::with_default_ttl();
        let u = user("u1");
        let first = store.guard(&u).await;
        // A second acquisition must wait until the first is dropped.
        let store2 = store.clone();
        let u2 = u.clone();
        let pending = tokio::spawn(async move {
            let _g = store2.guard(&u2).await;
        });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());
        drop(first);
        pending.await.unwrap();
    }

    #[test]
    fn take_and_put_back_preserve_stamp() {
        let store = SessionStore::with_default_ttl();
        let u = user("u1");
        let now = fixed_now();
        store.set(&u, Session::Idle, now);
        let stored = store.take(&u).unwrap();
        assert!(store.get(&u).is_none());
        store.put_back(&u, stored.session, stored.stored_at);
        let again = store.take(&u).unwrap();
        assert_eq!(again.stored_at, now);
    }
}
