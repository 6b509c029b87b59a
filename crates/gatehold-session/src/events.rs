//! Domain events published during the login lifecycle.

use std::sync::Arc;

use gatehold_protocol::Uuid;
use tokio::sync::broadcast;

use crate::UserRecord;

/// Something other subsystems may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    /// A login's data load finished. `user` is `None` when it failed.
    LoginProcessed {
        id: Uuid,
        username: String,
        user: Option<Arc<UserRecord>>,
    },

    /// A player entered the game; their contexts should be recomputed.
    ContextUpdateRequested { id: Uuid },
}

/// Where lifecycle events go.
///
/// `publish` must not block: it is called from login work and from the
/// connection tick.
pub trait EventBus: Send + Sync + 'static {
    fn publish(&self, event: LoginEvent);
}

/// An [`EventBus`] backed by a Tokio broadcast channel.
///
/// Publishing with no subscribers is fine; the event is dropped.
/// Subscribers that fall more than `capacity` events behind lose the
/// oldest ones.
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<LoginEvent>,
}

impl BroadcastEventBus {
    /// Default channel capacity.
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LoginEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: LoginEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }
}
