//! The session table: per-identity state shared by every connection.
//!
//! Three things are tracked per player id:
//!
//! - **pending**: which negotiation is the *current* login attempt. A load
//!   that finishes for an older attempt is ignored.
//! - **records**: loaded data, written by the negotiation work and read at
//!   acceptance and by permission checks.
//! - **contexts**: the query-context cache of a player who is in the game.
//!
//! Plus a "seen" set that survives eviction, so a missing record can be
//! told apart as "never processed" or "processed before".
//!
//! Every mutation touches one id and is idempotent, so completions that
//! arrive late (after a disconnect, or after a newer login started) cannot
//! corrupt another attempt's state.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use gatehold_negotiation::NegotiationId;
use gatehold_protocol::Uuid;

use crate::{ContextSet, QueryContextCache, UserRecord};

/// Concurrent per-identity session state.
#[derive(Debug, Default)]
pub struct SessionTable {
    records: DashMap<Uuid, Arc<UserRecord>>,
    pending: DashMap<Uuid, NegotiationId>,
    contexts: DashMap<Uuid, Arc<QueryContextCache>>,
    seen: DashSet<Uuid>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    // -- login ----------------------------------------------------------

    /// Marks `attempt` as the current login for `id`, superseding any
    /// earlier attempt.
    pub fn begin_login(&self, id: Uuid, attempt: NegotiationId) {
        if let Some(previous) = self.pending.insert(id, attempt) {
            tracing::debug!(%id, %previous, current = %attempt, "login attempt superseded");
        }
    }

    /// `true` if `attempt` is still the current login for `id`.
    pub fn is_current(&self, id: Uuid, attempt: NegotiationId) -> bool {
        self.pending.get(&id).is_some_and(|p| *p == attempt)
    }

    /// Stores `record` if `attempt` is still current. Returns whether it
    /// was stored.
    pub fn complete_load(
        &self,
        id: Uuid,
        attempt: NegotiationId,
        record: Arc<UserRecord>,
    ) -> bool {
        // Hold the pending entry while writing so a concurrent
        // `finish_login`/`abandon` for this id waits for us.
        let Some(current) = self.pending.get(&id) else {
            return false;
        };
        if *current != attempt {
            return false;
        }
        self.records.insert(id, record);
        true
    }

    /// Ends the login `attempt` for `id` and returns the record, if one
    /// was loaded.
    ///
    /// A newer attempt that is still negotiating keeps its pending entry,
    /// so its load is not discarded as stale.
    pub fn finish_login(&self, id: Uuid, attempt: NegotiationId) -> Option<Arc<UserRecord>> {
        self.pending.remove_if(&id, |_, p| *p == attempt);
        self.record(id)
    }

    /// Forgets `attempt` if it is still current. The record is dropped too
    /// unless the player is in the game on another connection.
    ///
    /// Returns `true` if anything was removed.
    pub fn abandon(&self, id: Uuid, attempt: NegotiationId) -> bool {
        if self.pending.remove_if(&id, |_, p| *p == attempt).is_none() {
            return false;
        }
        if !self.contexts.contains_key(&id) {
            self.records.remove(&id);
        }
        true
    }

    // -- seen -----------------------------------------------------------

    pub fn mark_seen(&self, id: Uuid) {
        self.seen.insert(id);
    }

    /// Whether a login for `id` was ever processed.
    pub fn has_seen(&self, id: Uuid) -> bool {
        self.seen.contains(&id)
    }

    // -- in game --------------------------------------------------------

    /// Creates (or replaces) the query-context cache for a player who just
    /// entered the game.
    pub fn attach(&self, id: Uuid, contexts: ContextSet) -> Arc<QueryContextCache> {
        let cache = Arc::new(QueryContextCache::new(id, contexts));
        self.contexts.insert(id, Arc::clone(&cache));
        cache
    }

    /// Drops the context cache and the record for a player who left.
    ///
    /// The record is kept when a newer login for the same id is already
    /// pending: it belongs to that login now. Returns `true` if anything
    /// was removed, so repeated calls are harmless.
    pub fn release(&self, id: Uuid) -> bool {
        let had_context = self.contexts.remove(&id).is_some();
        let had_record = if self.pending.contains_key(&id) {
            false
        } else {
            self.records.remove(&id).is_some()
        };
        had_context || had_record
    }

    // -- lookups --------------------------------------------------------

    pub fn record(&self, id: Uuid) -> Option<Arc<UserRecord>> {
        self.records.get(&id).map(|r| Arc::clone(r.value()))
    }

    pub fn context(&self, id: Uuid) -> Option<Arc<QueryContextCache>> {
        self.contexts.get(&id).map(|c| Arc::clone(c.value()))
    }

    pub fn is_pending(&self, id: Uuid) -> bool {
        self.pending.contains_key(&id)
    }

    /// Number of players with a context cache (in the game).
    pub fn attached_count(&self) -> usize {
        self.contexts.len()
    }

    /// Number of loaded records.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Uuid {
        gatehold_protocol::offline_uuid("Alice")
    }

    fn record() -> Arc<UserRecord> {
        Arc::new(UserRecord::new(id(), "Alice"))
    }

    #[test]
    fn test_complete_load_stores_for_current_attempt() {
        let table = SessionTable::new();
        table.begin_login(id(), NegotiationId::new(1));

        assert!(table.complete_load(id(), NegotiationId::new(1), record()));
        assert!(table.record(id()).is_some());
    }

    #[test]
    fn test_complete_load_ignores_stale_attempt() {
        let table = SessionTable::new();
        table.begin_login(id(), NegotiationId::new(1));
        table.begin_login(id(), NegotiationId::new(2));

        assert!(!table.complete_load(id(), NegotiationId::new(1), record()));
        assert!(table.record(id()).is_none());
    }

    #[test]
    fn test_complete_load_after_abandon_is_ignored() {
        let table = SessionTable::new();
        table.begin_login(id(), NegotiationId::new(1));
        assert!(table.abandon(id(), NegotiationId::new(1)));

        assert!(!table.complete_load(id(), NegotiationId::new(1), record()));
        assert_eq!(table.record_count(), 0);
    }

    #[test]
    fn test_finish_login_clears_pending() {
        let table = SessionTable::new();
        table.begin_login(id(), NegotiationId::new(1));
        table.complete_load(id(), NegotiationId::new(1), record());

        assert!(table.finish_login(id(), NegotiationId::new(1)).is_some());
        assert!(!table.is_pending(id()));
    }

    #[test]
    fn test_finish_login_of_older_attempt_keeps_newer_pending() {
        let table = SessionTable::new();
        table.begin_login(id(), NegotiationId::new(1));
        table.complete_load(id(), NegotiationId::new(1), record());
        table.begin_login(id(), NegotiationId::new(2));

        assert!(table.finish_login(id(), NegotiationId::new(1)).is_some());
        assert!(table.is_current(id(), NegotiationId::new(2)));
        assert!(table.complete_load(id(), NegotiationId::new(2), record()));
    }

    #[test]
    fn test_release_is_idempotent() {
        let table = SessionTable::new();
        table.begin_login(id(), NegotiationId::new(1));
        table.complete_load(id(), NegotiationId::new(1), record());
        table.finish_login(id(), NegotiationId::new(1));
        table.attach(id(), ContextSet::new());

        assert!(table.release(id()));
        assert!(!table.release(id()));
        assert_eq!(table.record_count(), 0);
        assert_eq!(table.attached_count(), 0);
    }

    #[test]
    fn test_release_keeps_record_for_pending_login() {
        let table = SessionTable::new();
        // Old session in game.
        table.begin_login(id(), NegotiationId::new(1));
        table.complete_load(id(), NegotiationId::new(1), record());
        table.finish_login(id(), NegotiationId::new(1));
        table.attach(id(), ContextSet::new());
        // New login loaded while the old one is still in game.
        table.begin_login(id(), NegotiationId::new(2));
        table.complete_load(id(), NegotiationId::new(2), record());

        assert!(table.release(id()));
        assert!(table.record(id()).is_some(), "new login keeps its record");
        assert_eq!(table.attached_count(), 0);
    }

    #[test]
    fn test_abandon_keeps_record_of_player_in_game() {
        let table = SessionTable::new();
        table.begin_login(id(), NegotiationId::new(1));
        table.complete_load(id(), NegotiationId::new(1), record());
        table.finish_login(id(), NegotiationId::new(1));
        table.attach(id(), ContextSet::new());

        table.begin_login(id(), NegotiationId::new(2));
        assert!(table.abandon(id(), NegotiationId::new(2)));
        assert!(table.record(id()).is_some());
    }

    #[test]
    fn test_abandon_of_superseded_attempt_is_noop() {
        let table = SessionTable::new();
        table.begin_login(id(), NegotiationId::new(1));
        table.begin_login(id(), NegotiationId::new(2));

        assert!(!table.abandon(id(), NegotiationId::new(1)));
        assert!(table.is_current(id(), NegotiationId::new(2)));
    }

    #[test]
    fn test_seen_survives_release() {
        let table = SessionTable::new();
        table.mark_seen(id());
        table.release(id());
        assert!(table.has_seen(id()));
    }
}
