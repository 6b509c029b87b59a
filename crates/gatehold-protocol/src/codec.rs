//! Codec trait and implementations for turning login packets into bytes.
//!
//! Packet encoding for the real game protocol lives outside this
//! workspace. The [`Codec`] trait is the seam where it plugs in; the
//! bundled [`JsonCodec`] is what the WebSocket transport and the tests
//! speak.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode packets to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T)
    -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Human-readable, which makes login traces easy to inspect. Behind the
/// `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use gatehold_protocol::{ClientPacket, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let hello = ClientPacket::Hello { name: "Alice".into(), id: None };
///
/// let bytes = codec.encode(&hello).unwrap();
/// let decoded: ClientPacket = codec.decode(&bytes).unwrap();
/// assert_eq!(hello, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
