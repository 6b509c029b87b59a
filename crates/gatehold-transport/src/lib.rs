//! Transport abstraction layer for Gatehold.
//!
//! The login state machine never touches sockets. It talks to a
//! [`LoginConnection`]: something that can queue a [`ServerPacket`],
//! switch on encryption and compression, and close with a reason.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryConnection`]: an in-process loopback link (single-player,
//!   tests). Loopback links skip the key exchange.
//! - [`WebSocketConnection`]: a real network socket, behind the
//!   `websocket` feature.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::MemoryConnection;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;

use gatehold_protocol::{Notice, ServerPacket};

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// A symmetric stream cipher applied in place to every byte that crosses
/// the link once encryption is on.
///
/// The primitive itself (AES/CFB8 in the reference game) is supplied by
/// whoever implements the key exchange.
pub trait StreamCipher: Send + 'static {
    /// Encrypts or decrypts `data` in place, advancing the cipher state.
    fn apply(&mut self, data: &mut [u8]);
}

/// The two halves of a session cipher: one for inbound, one for outbound.
pub struct CipherPair {
    /// Applied to bytes received from the client.
    pub decrypt: Box<dyn StreamCipher>,
    /// Applied to bytes sent to the client.
    pub encrypt: Box<dyn StreamCipher>,
}

impl fmt::Debug for CipherPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherPair").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// LoginConnection
// ---------------------------------------------------------------------------

/// One client connection as seen by the login pipeline.
///
/// All methods are synchronous and must not block: `send` queues the
/// packet, it does not wait for the peer. The state machine calls these
/// from its tick, so a slow socket must never stall the tick.
///
/// Methods take `&self` because connections are shared (`Arc`) between the
/// state machine, the negotiation ticket's weak back-reference, and the
/// online player table.
pub trait LoginConnection: Send + Sync + 'static {
    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// The peer's socket address. `None` for in-process links.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// `true` for in-process links that never leave the machine.
    fn is_loopback(&self) -> bool;

    /// `false` once [`close`](Self::close) ran or the peer went away.
    fn is_open(&self) -> bool;

    /// Queues a packet for the peer.
    fn send(&self, packet: ServerPacket) -> Result<(), TransportError>;

    /// Tears the link down. `reason` is for logs and close frames; the
    /// disconnect packet itself is sent separately by the caller.
    fn close(&self, reason: &Notice) -> Result<(), TransportError>;

    /// Switches the link to encrypted mode. Packets queued before this
    /// call go out in the clear.
    fn enable_encryption(
        &self,
        ciphers: CipherPair,
    ) -> Result<(), TransportError>;

    /// Enables compression for frames larger than `threshold` bytes.
    fn set_compression(&self, threshold: u32) -> Result<(), TransportError>;
}
