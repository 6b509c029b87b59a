//! Error types for the login layer.

use gatehold_negotiation::{NegotiationError, TaskFailure};
use gatehold_protocol::{Notice, ProtocolError};
use gatehold_transport::TransportError;

/// Everything that can end a login early.
///
/// Each variant maps to the [`Notice`] the client is shown through
/// [`notice`](Self::notice).
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// The client broke the login protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection failed underneath us.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The authentication service does not recognise the session.
    #[error("authentication rejected {username}")]
    AuthRejected { username: String },

    /// The authentication service could not be reached.
    #[error("authentication service unavailable: {0}")]
    AuthUnavailable(String),

    /// The login did not finish in time.
    #[error("login timed out after {ticks} ticks")]
    Timeout { ticks: u32 },

    /// A negotiation participant refused the login.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// A background worker crashed.
    #[error("login worker failed: {0}")]
    Worker(#[from] TaskFailure),

    /// An admission check or the handshake screen refused the client.
    #[error("login refused: {0}")]
    Refused(Notice),

    /// The client answered a custom query nobody handles.
    #[error("unexpected custom query response {transaction_id}")]
    UnexpectedQueryResponse { transaction_id: u32 },

    /// The server is set up for online mode but has no key exchange.
    #[error("online mode is enabled but no key exchange is configured")]
    MissingKeyExchange,
}

impl LoginError {
    /// The reason shown to the client when this error ends the login.
    pub fn notice(&self) -> Notice {
        match self {
            Self::Protocol(_) => Notice::ProtocolError,
            Self::Transport(_) | Self::Worker(_) | Self::MissingKeyExchange => {
                Notice::InternalError
            }
            Self::AuthRejected { .. } => Notice::UnverifiedUsername,
            Self::AuthUnavailable(_) => Notice::AuthServersDown,
            Self::Timeout { .. } => Notice::SlowLogin,
            Self::Negotiation(e) => e.notice(),
            Self::Refused(notice) => notice.clone(),
            Self::UnexpectedQueryResponse { .. } => Notice::UnexpectedQueryResponse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_errors_show_protocol_error() {
        let err = LoginError::from(ProtocolError::NonceMismatch);
        assert_eq!(err.notice(), Notice::ProtocolError);
    }

    #[test]
    fn test_auth_errors_map_to_vanilla_reasons() {
        assert_eq!(
            LoginError::AuthRejected {
                username: "Alice".into()
            }
            .notice(),
            Notice::UnverifiedUsername
        );
        assert_eq!(
            LoginError::AuthUnavailable("timeout".into()).notice(),
            Notice::AuthServersDown
        );
    }

    #[test]
    fn test_negotiation_rejection_passes_notice_through() {
        let err = LoginError::from(NegotiationError::Rejected(Notice::DatabaseError));
        assert_eq!(err.notice(), Notice::DatabaseError);
    }

    #[test]
    fn test_worker_crash_is_internal_error() {
        let err = LoginError::from(TaskFailure::Panicked("boom".into()));
        assert_eq!(err.notice(), Notice::InternalError);
    }
}
