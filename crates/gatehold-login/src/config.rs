//! Login configuration.

use serde::{Deserialize, Serialize};

/// How logins are authenticated and what the server speaks.
///
/// Every field has a default; a host loads this from its own config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Require the key exchange and the authentication service for every
    /// non-loopback connection.
    pub online_mode: bool,

    /// Let players in with an offline identity when the authentication
    /// service rejects them or cannot be reached. A single-player host
    /// opening its world to the LAN runs this way.
    pub permissive: bool,

    /// Pass the client's IP to the authentication service, so a session
    /// opened from another address is refused.
    pub prevent_proxy_connections: bool,

    /// Frames above this many bytes are compressed after login. `None`
    /// disables compression.
    pub compression_threshold: Option<u32>,

    /// Protocol version clients must speak.
    pub protocol_version: u32,

    /// Human-readable game version, shown to clients that speak the wrong
    /// protocol.
    pub game_version: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            online_mode: true,
            permissive: false,
            prevent_proxy_connections: false,
            compression_threshold: Some(256),
            protocol_version: 754,
            game_version: "1.16.5".to_string(),
        }
    }
}

impl LoginConfig {
    /// A config for servers that do not authenticate players.
    pub fn offline() -> Self {
        Self {
            online_mode: false,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_online_and_strict() {
        let cfg = LoginConfig::default();
        assert!(cfg.online_mode);
        assert!(!cfg.permissive);
        assert!(!cfg.prevent_proxy_connections);
        assert_eq!(cfg.compression_threshold, Some(256));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: LoginConfig =
            serde_json::from_str(r#"{"online_mode":false,"compression_threshold":null}"#).unwrap();
        assert!(!cfg.online_mode);
        assert_eq!(cfg.compression_threshold, None);
        assert_eq!(cfg.protocol_version, 754);
    }
}
