//! Login negotiation for Gatehold.
//!
//! Between authentication and acceptance a login is *negotiated*: every
//! registered [`NegotiationParticipant`] is shown a [`NegotiationTicket`]
//! and may attach background work to it (loading the player's data,
//! asking an external whitelist). The login only proceeds once all of that
//! work has settled.
//!
//! ```text
//! dispatch ──▶ participant A ──▶ participant B ──▶ Negotiation
//!              (enqueue load)    (nothing)          poll() each tick
//! ```
//!
//! The broadcast is synchronous and awaits nothing. Work runs on a shared
//! [`WorkerPool`]; the login state machine polls the resulting
//! [`Negotiation`] from its tick.

mod dispatcher;
mod error;
mod pool;
mod ticket;

pub use dispatcher::{NegotiationDispatcher, NegotiationParticipant};
pub use error::{NegotiationError, TaskFailure};
pub use pool::{DEFAULT_MAX_WORKERS, TaskHandle, WorkerPool};
pub use ticket::{
    Negotiation, NegotiationId, NegotiationStatus, NegotiationTicket, WorkHandle,
};
