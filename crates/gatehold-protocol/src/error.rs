//! Error types for the protocol layer.
//!
//! Every variant here is fatal for the connection it happened on: the
//! login state machine answers any `ProtocolError` by disconnecting with
//! [`Notice::ProtocolError`](crate::Notice::ProtocolError).

/// Errors that can occur while encoding, decoding, or sequencing login
/// packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a packet into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a packet).
    ///
    /// Common causes: malformed JSON, an unknown packet type, or a
    /// truncated frame.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A packet arrived in a phase that does not expect it, e.g. a
    /// second `Hello` or an encryption response before it was requested.
    #[error("unexpected {packet} packet during {phase}")]
    UnexpectedPacket {
        packet: &'static str,
        phase: String,
    },

    /// The nonce echoed in the encryption response does not match the
    /// one the server issued.
    #[error("encryption response nonce does not match the issued nonce")]
    NonceMismatch,

    /// The key exchange could not decrypt the response or derive the
    /// session ciphers.
    #[error("key exchange failed: {0}")]
    Crypto(String),

    /// The message is invalid at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
