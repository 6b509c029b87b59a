//! The login pipeline for Gatehold.
//!
//! One [`LoginStateMachine`] per connection takes a client from its first
//! `Hello` to a placed player:
//!
//! ```text
//! handshake ─▶ screen_handshake ─▶ LoginStateMachine
//!                                    ├─ key exchange      (KeyExchange)
//!                                    ├─ authentication    (Authenticator, on the pool)
//!                                    ├─ negotiation       (NegotiationDispatcher)
//!                                    └─ acceptance        (PlayerList)
//! ```
//!
//! The machine only ever polls. Whatever drives it calls
//! [`LoginStateMachine::handle_packet`] for each client packet and
//! [`LoginStateMachine::tick`] once per server tick.

mod auth;
mod config;
mod error;
mod handshake;
mod machine;
mod services;

pub use auth::verify_identity;
pub use config::LoginConfig;
pub use error::LoginError;
pub use handshake::screen_handshake;
pub use machine::{LOGIN_TIMEOUT_TICKS, LoginPhase, LoginStateMachine, SERVER_ID};
pub use services::{
    Authenticator, CustomQueryHandler, KeyExchange, LoginServices, OfflineAuthenticator,
    PlayerList, Verification,
};
