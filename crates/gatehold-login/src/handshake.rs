//! Handshake screening: the gate in front of the login state machine.

use gatehold_protocol::{ClientPacket, Intention, Notice, ProtocolError};

use crate::{LoginConfig, LoginError};

/// Checks the first packet of a connection.
///
/// Returns the client's intention when it speaks our protocol version.
/// A client on another version is refused with a notice naming the
/// server's game version: "outdated client" if it is older, "incompatible"
/// otherwise.
pub fn screen_handshake(config: &LoginConfig, packet: &ClientPacket) -> Result<Intention, LoginError> {
    let ClientPacket::Handshake {
        protocol_version,
        intention,
    } = packet
    else {
        return Err(ProtocolError::UnexpectedPacket {
            packet: packet.kind(),
            phase: "handshake".into(),
        }
        .into());
    };

    if *intention == Intention::Login && *protocol_version != config.protocol_version {
        let server_version = config.game_version.clone();
        let notice = if *protocol_version < config.protocol_version {
            Notice::OutdatedClient { server_version }
        } else {
            Notice::IncompatibleClient { server_version }
        };
        return Err(LoginError::Refused(notice));
    }

    Ok(*intention)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake(protocol_version: u32, intention: Intention) -> ClientPacket {
        ClientPacket::Handshake {
            protocol_version,
            intention,
        }
    }

    #[test]
    fn test_matching_version_passes() {
        let config = LoginConfig::default();
        let result = screen_handshake(&config, &handshake(754, Intention::Login));
        assert_eq!(result.unwrap(), Intention::Login);
    }

    #[test]
    fn test_older_client_is_outdated() {
        let config = LoginConfig::default();
        let err = screen_handshake(&config, &handshake(753, Intention::Login)).unwrap_err();
        assert_eq!(
            err.notice(),
            Notice::OutdatedClient {
                server_version: "1.16.5".into()
            }
        );
    }

    #[test]
    fn test_newer_client_is_incompatible() {
        let config = LoginConfig::default();
        let err = screen_handshake(&config, &handshake(755, Intention::Login)).unwrap_err();
        assert_eq!(
            err.notice(),
            Notice::IncompatibleClient {
                server_version: "1.16.5".into()
            }
        );
    }

    #[test]
    fn test_status_is_not_version_checked() {
        let config = LoginConfig::default();
        let result = screen_handshake(&config, &handshake(1, Intention::Status));
        assert_eq!(result.unwrap(), Intention::Status);
    }

    #[test]
    fn test_hello_before_handshake_is_protocol_error() {
        let config = LoginConfig::default();
        let packet = ClientPacket::Hello {
            name: "Alice".into(),
            id: None,
        };
        let err = screen_handshake(&config, &packet).unwrap_err();
        assert!(matches!(
            err,
            LoginError::Protocol(ProtocolError::UnexpectedPacket { packet: "hello", .. })
        ));
    }
}
