//! The connection lifecycle coordinator.
//!
//! Hooks the player-data store into the three moments that matter:
//!
//! ```text
//! negotiation ──▶ on_negotiate      enqueue the data load
//!                 (work settles)    record stored, LoginProcessed
//! placement   ──▶ on_post_accept    check data, attach contexts
//! leaving     ──▶ on_disconnect     release record and contexts
//! ```
//!
//! If the connection dies between negotiation and placement, the
//! negotiation is abandoned and [`NegotiationParticipant::on_abandon`]
//! cleans up instead of `on_disconnect`.

use std::sync::Arc;

use gatehold_negotiation::{
    NegotiationError, NegotiationId, NegotiationParticipant, NegotiationTicket,
};
use gatehold_protocol::{Identity, Notice, ServerPacket, Uuid};
use gatehold_transport::LoginConnection;

use crate::{
    EventBus, LifecycleConfig, LoginEvent, PermissionHolder, SessionTable, UserStore,
};

/// Logs at `info` when `debug_logins` is on, at `debug` otherwise.
macro_rules! login_trace {
    ($config:expr, $($arg:tt)+) => {
        if $config.debug_logins {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Preloads player data during login and tears it down on disconnect.
///
/// Register it with the negotiation dispatcher so every login waits for
/// its data, and call [`on_post_accept`](Self::on_post_accept) /
/// [`on_disconnect`](Self::on_disconnect) from whatever owns the online
/// player list.
pub struct ConnectionLifecycle<S> {
    store: Arc<S>,
    table: Arc<SessionTable>,
    events: Arc<dyn EventBus>,
    config: Arc<LifecycleConfig>,
}

impl<S> Clone for ConnectionLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table: Arc::clone(&self.table),
            events: Arc::clone(&self.events),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: UserStore> ConnectionLifecycle<S> {
    pub fn new(store: Arc<S>, events: Arc<dyn EventBus>, config: LifecycleConfig) -> Self {
        Self {
            store,
            table: Arc::new(SessionTable::new()),
            events,
            config: Arc::new(config),
        }
    }

    pub fn table(&self) -> &Arc<SessionTable> {
        &self.table
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// The player is in the game. Looks up the data preloaded by
    /// `attempt`, attaches their query contexts, and returns the
    /// permission view to hang on the player.
    ///
    /// A player without data is warned or disconnected depending on
    /// `cancel_failed_logins`; either way they still get a (data-less)
    /// permission view, where every check is undefined.
    pub fn on_post_accept(
        &self,
        identity: &Identity,
        attempt: NegotiationId,
        conn: &dyn LoginConnection,
    ) -> PermissionHolder {
        let id = identity.canonical_id();
        let name = &identity.name;
        login_trace!(self.config, "Processing post-login for {id} - {name}");

        if self.table.finish_login(id, attempt).is_none() {
            if self.table.has_seen(id) {
                tracing::warn!(
                    "User {id} - {name} doesn't currently have data pre-loaded, \
                     but they have been processed before in this session."
                );
            } else {
                tracing::warn!(
                    "User {id} - {name} doesn't have data pre-loaded, \
                     they have never been processed during pre-login in this session."
                );
            }

            let notice = Notice::LoadingStateError;
            if self.config.cancel_failed_logins {
                if let Err(e) = conn.send(ServerPacket::Disconnect {
                    reason: notice.clone(),
                }) {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "failed to send disconnect");
                }
                if let Err(e) = conn.close(&notice) {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "failed to close connection");
                }
            } else if let Err(e) = conn.send(ServerPacket::SystemChat { message: notice }) {
                tracing::debug!(conn_id = %conn.id(), error = %e, "failed to send warning");
            }
        }

        self.table.attach(id, self.config.static_contexts.clone());
        self.events.publish(LoginEvent::ContextUpdateRequested { id });

        PermissionHolder::new(id, Arc::clone(&self.table))
    }

    /// The player left the game. Safe to call more than once, and for
    /// players whose data never loaded.
    pub fn on_disconnect(&self, identity: &Identity) {
        let id = identity.canonical_id();
        if self.table.release(id) {
            self.store.invalidate_context(id);
            login_trace!(self.config, "Processed disconnect for {id} - {}", identity.name);
        }
    }

    async fn load_for_login(
        self,
        id: Uuid,
        username: String,
        attempt: NegotiationId,
    ) -> Result<(), NegotiationError> {
        login_trace!(self.config, "Processing pre-login (async phase) for {id} - {username}");

        match self.store.load(id, &username).await {
            Ok(record) => {
                let record = Arc::new(record);
                if !self.table.complete_load(id, attempt, Arc::clone(&record)) {
                    tracing::debug!(
                        %id,
                        negotiation = %attempt,
                        "login no longer current, discarding loaded data"
                    );
                }
                self.table.mark_seen(id);
                self.events.publish(LoginEvent::LoginProcessed {
                    id,
                    username,
                    user: Some(record),
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Exception occurred whilst loading data for {id} - {username}"
                );
                self.events.publish(LoginEvent::LoginProcessed {
                    id,
                    username,
                    user: None,
                });
                if self.config.cancel_failed_logins {
                    Err(NegotiationError::Rejected(Notice::DatabaseError))
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl<S: UserStore> NegotiationParticipant for ConnectionLifecycle<S> {
    fn on_negotiate(&self, ticket: &mut NegotiationTicket) {
        let identity = ticket.identity();
        let id = identity.canonical_id();
        let username = identity.name.clone();
        let attempt = ticket.id();

        login_trace!(self.config, "Processing pre-login (sync phase) for {id} - {username}");

        self.table.begin_login(id, attempt);
        let this = self.clone();
        ticket.enqueue_work("load user data", this.load_for_login(id, username, attempt));
    }

    fn on_abandon(&self, attempt: NegotiationId, identity: &Identity) {
        let id = identity.canonical_id();
        if self.table.abandon(id, attempt) {
            login_trace!(self.config, "Discarded pre-login data for {id} - {}", identity.name);
        }
    }
}

impl<S> std::fmt::Debug for ConnectionLifecycle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLifecycle")
            .field("config", &self.config)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
