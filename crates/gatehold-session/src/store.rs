//! The user-data store seam.
//!
//! Gatehold does not know where player data lives (a database, flat
//! files, a remote service). It only needs the [`UserStore`] trait. The
//! bundled [`MemoryUserStore`] keeps everything in a map and is what the
//! demo server and the tests use.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use gatehold_protocol::Uuid;

use crate::{SessionError, UserRecord};

/// Loads player data during login.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because one store is shared by every login, and
/// loads run on the worker pool.
///
/// # Example
///
/// ```rust
/// use gatehold_session::{SessionError, UserRecord, UserStore};
/// use gatehold_protocol::Uuid;
///
/// /// Every player starts with nothing.
/// struct EmptyStore;
///
/// impl UserStore for EmptyStore {
///     async fn load(&self, id: Uuid, username: &str) -> Result<UserRecord, SessionError> {
///         Ok(UserRecord::new(id, username))
///     }
///
///     fn invalidate_context(&self, _id: Uuid) {}
/// }
/// ```
pub trait UserStore: Send + Sync + 'static {
    /// Fetches (or creates) the record for `id`. `username` is the name the
    /// player logged in with, for stores that track name changes.
    fn load(
        &self,
        id: Uuid,
        username: &str,
    ) -> impl Future<Output = Result<UserRecord, SessionError>> + Send;

    /// Drops any cached query results for `id`. Called when the player
    /// leaves.
    fn invalidate_context(&self, id: Uuid);
}

/// An in-memory [`UserStore`].
///
/// Unknown players get an empty record, mirroring how a real store creates
/// a user on first login. Failure and latency can be switched on to
/// exercise the unhappy paths.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    records: DashMap<Uuid, UserRecord>,
    failing: AtomicBool,
    delay: std::sync::Mutex<Option<Duration>>,
    loads: AtomicUsize,
    invalidations: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record`, replacing any previous one for the same id.
    pub fn insert(&self, record: UserRecord) {
        self.records.insert(record.id, record);
    }

    /// Makes every subsequent load fail with [`SessionError::Storage`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes every subsequent load take `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Number of loads started so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of `invalidate_context` calls so far.
    pub fn invalidation_count(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl UserStore for MemoryUserStore {
    async fn load(&self, id: Uuid, username: &str) -> Result<UserRecord, SessionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(SessionError::Storage("memory store set to fail".into()));
        }

        let record = self
            .records
            .entry(id)
            .or_insert_with(|| UserRecord::new(id, username));
        Ok(record.clone())
    }

    fn invalidate_context(&self, _id: Uuid) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_creates_empty_record() {
        let store = MemoryUserStore::new();
        let id = Uuid::nil();

        let record = store.load(id, "Alice").await.unwrap();
        assert_eq!(record, UserRecord::new(id, "Alice"));
        assert_eq!(store.load_count(), 1);
    }

    #[tokio::test]
    async fn test_load_returns_inserted_record() {
        let store = MemoryUserStore::new();
        let stored = UserRecord::new(Uuid::nil(), "Alice")
            .with_node(crate::PermissionNode::new("chat.send", true));
        store.insert(stored.clone());

        assert_eq!(store.load(Uuid::nil(), "Alice").await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_failing_store_returns_storage_error() {
        let store = MemoryUserStore::new();
        store.set_failing(true);

        let result = store.load(Uuid::nil(), "Alice").await;
        assert!(matches!(result, Err(SessionError::Storage(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_applied() {
        let store = MemoryUserStore::new();
        store.set_delay(Some(Duration::from_secs(2)));

        let start = tokio::time::Instant::now();
        store.load(Uuid::nil(), "Alice").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
