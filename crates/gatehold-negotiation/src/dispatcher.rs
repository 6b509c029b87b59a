//! Participant registry and the synchronous broadcast.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gatehold_protocol::Identity;
use gatehold_transport::LoginConnection;

use crate::{Negotiation, NegotiationId, NegotiationTicket, WorkerPool};

/// A subsystem that wants a say before a player is let in.
///
/// Implementations must return quickly from
/// [`on_negotiate`](Self::on_negotiate): it runs on the connection's tick.
/// Anything slow goes into
/// [`NegotiationTicket::enqueue_work`].
///
/// ```rust
/// use gatehold_negotiation::{NegotiationParticipant, NegotiationTicket};
///
/// struct Greeter;
///
/// impl NegotiationParticipant for Greeter {
///     fn on_negotiate(&self, ticket: &mut NegotiationTicket) {
///         let name = ticket.identity().name.clone();
///         ticket.enqueue_work("greet", async move {
///             tracing::info!(%name, "welcome");
///             Ok(())
///         });
///     }
/// }
/// ```
pub trait NegotiationParticipant: Send + Sync + 'static {
    /// Called once per login, during the broadcast.
    fn on_negotiate(&self, ticket: &mut NegotiationTicket);

    /// Called when a negotiation this participant saw will not lead to a
    /// placed player.
    fn on_abandon(&self, _id: NegotiationId, _identity: &Identity) {}
}

/// Creates tickets and broadcasts them to every registered participant.
///
/// Register participants while building the server, then share the
/// dispatcher (it is used through `&self` from then on).
pub struct NegotiationDispatcher {
    participants: Vec<Arc<dyn NegotiationParticipant>>,
    pool: WorkerPool,
    next_id: AtomicU64,
}

impl NegotiationDispatcher {
    /// Creates a dispatcher whose tickets run work on `pool`.
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            participants: Vec::new(),
            pool,
            next_id: AtomicU64::new(1),
        }
    }

    /// Adds a participant. Participants are notified in registration
    /// order.
    pub fn register(&mut self, participant: Arc<dyn NegotiationParticipant>) {
        self.participants.push(participant);
    }

    /// Number of registered participants.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// The pool tickets spawn work on.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Broadcasts a new ticket for `identity` and returns the resulting
    /// negotiation.
    ///
    /// Nothing is awaited here. A participant that panics propagates the
    /// panic to the caller.
    pub fn dispatch(
        &self,
        identity: Identity,
        connection: &Arc<dyn LoginConnection>,
    ) -> Negotiation {
        let id = NegotiationId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut ticket = NegotiationTicket::new(
            id,
            identity,
            Arc::downgrade(connection),
            self.pool.clone(),
        );

        for participant in &self.participants {
            participant.on_negotiate(&mut ticket);
        }

        tracing::debug!(
            negotiation = %id,
            player = %ticket.identity(),
            participants = self.participants.len(),
            work = ticket.work_count(),
            "negotiation dispatched"
        );

        ticket.into_negotiation(self.participants.clone())
    }
}

impl std::fmt::Debug for NegotiationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiationDispatcher")
            .field("participants", &self.participants.len())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
