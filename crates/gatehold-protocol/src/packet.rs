//! Login-phase packets.
//!
//! Only the packets exchanged *before* a player enters the game are
//! modelled here. Everything after [`ServerPacket::LoginSuccess`] belongs
//! to the game protocol, except [`ServerPacket::SystemChat`], which the
//! lifecycle coordinator needs for its post-login warning.
//!
//! Byte arrays are carried as `Vec<u8>`; how they are framed on the wire
//! is the codec's business.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Identity, Notice};

/// What the client wants to do after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intention {
    /// Log in and play.
    Login,
    /// Query the server list status (player count, motd).
    Status,
}

/// Packets sent by the client while logging in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientPacket {
    /// First packet on any connection: protocol version and intention.
    Handshake {
        protocol_version: u32,
        intention: Intention,
    },

    /// "Hello, I am `name`." The id is optional and untrusted.
    Hello { name: String, id: Option<Uuid> },

    /// Answer to [`ServerPacket::EncryptionRequest`]. Both fields are
    /// encrypted with the server's public key.
    EncryptionResponse {
        shared_secret: Vec<u8>,
        nonce: Vec<u8>,
    },

    /// Answer to a login-time custom query. `data` is `None` when the
    /// client did not understand the query.
    CustomQueryResponse {
        transaction_id: u32,
        data: Option<Vec<u8>>,
    },
}

impl ClientPacket {
    /// Short name used in logs and protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::Hello { .. } => "hello",
            Self::EncryptionResponse { .. } => "encryption_response",
            Self::CustomQueryResponse { .. } => "custom_query_response",
        }
    }
}

/// Packets sent by the server while logging a client in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerPacket {
    /// Starts the key exchange. `nonce` must be echoed back encrypted.
    EncryptionRequest {
        server_id: String,
        public_key: Vec<u8>,
        nonce: [u8; 4],
    },

    /// Packets after this one are compressed above `threshold` bytes.
    EnableCompression { threshold: u32 },

    /// Login finished; the client is now in the game.
    LoginSuccess { identity: Identity },

    /// Login refused; the connection closes right after.
    Disconnect { reason: Notice },

    /// A chat line shown to a player who is already in the game.
    SystemChat { message: Notice },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_json_shape() {
        let packet = ClientPacket::Hello {
            name: "Alice".into(),
            id: None,
        };
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["type"], "hello");
        assert_eq!(json["name"], "Alice");
        assert!(json["id"].is_null());
    }

    #[test]
    fn test_handshake_parses_from_client_json() {
        let json = r#"{"type":"handshake","protocol_version":754,"intention":"login"}"#;
        let packet: ClientPacket = serde_json::from_str(json).unwrap();
        assert_eq!(
            packet,
            ClientPacket::Handshake {
                protocol_version: 754,
                intention: Intention::Login,
            }
        );
    }

    #[test]
    fn test_disconnect_nests_notice() {
        let packet = ServerPacket::Disconnect {
            reason: Notice::SlowLogin,
        };
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["type"], "disconnect");
        assert_eq!(json["reason"]["key"], "slow_login");
    }

    #[test]
    fn test_packet_kind_names() {
        let packet = ClientPacket::EncryptionResponse {
            shared_secret: vec![],
            nonce: vec![],
        };
        assert_eq!(packet.kind(), "encryption_response");
    }

    #[test]
    fn test_unknown_packet_type_is_rejected() {
        let json = r#"{"type":"teleport","x":1}"#;
        assert!(serde_json::from_str::<ClientPacket>(json).is_err());
    }
}
