//! Login protocol for Gatehold.
//!
//! This crate defines what clients and the gatekeeper say to each other
//! before a player is allowed into the game:
//!
//! - **Identity** ([`Identity`], [`offline_uuid`]): who a client claims to
//!   be, and the deterministic fallback id for unverified players.
//! - **Packets** ([`ClientPacket`], [`ServerPacket`]): the login-phase
//!   messages.
//! - **Notices** ([`Notice`]): translatable disconnect reasons and warnings.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): packets to bytes and back.
//! - **Errors** ([`ProtocolError`]): everything that is fatal at this layer.
//!
//! ```text
//! Transport (bytes) → Protocol (packets) → Login state machine
//! ```

mod codec;
mod error;
mod identity;
mod notice;
mod packet;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use identity::{Identity, offline_uuid};
pub use notice::Notice;
pub use packet::{ClientPacket, Intention, ServerPacket};

/// Re-exported so downstream crates name the same `Uuid` type.
pub use uuid::Uuid;
