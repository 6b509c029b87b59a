//! Unified error type for Gatehold.

use gatehold_login::LoginError;
use gatehold_negotiation::NegotiationError;
use gatehold_protocol::ProtocolError;
use gatehold_session::SessionError;
use gatehold_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `gatehold` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GateholdError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (decode, unexpected packet, bad key exchange).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A login was refused or failed.
    #[error(transparent)]
    Login(#[from] LoginError),

    /// A negotiation participant refused or crashed.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// Player data could not be loaded.
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehold_protocol::{Notice, Uuid};

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let gatehold_err: GateholdError = err.into();
        assert!(matches!(gatehold_err, GateholdError::Transport(_)));
        assert!(gatehold_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let gatehold_err: GateholdError = err.into();
        assert!(matches!(gatehold_err, GateholdError::Protocol(_)));
    }

    #[test]
    fn test_from_login_error() {
        let err = LoginError::Timeout { ticks: 600 };
        let gatehold_err: GateholdError = err.into();
        assert!(matches!(gatehold_err, GateholdError::Login(_)));
        assert!(gatehold_err.to_string().contains("600"));
    }

    #[test]
    fn test_from_negotiation_error() {
        let err = NegotiationError::Rejected(Notice::DatabaseError);
        let gatehold_err: GateholdError = err.into();
        assert!(matches!(gatehold_err, GateholdError::Negotiation(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::NotFound(Uuid::nil());
        let gatehold_err: GateholdError = err.into();
        assert!(matches!(gatehold_err, GateholdError::Session(_)));
    }
}
