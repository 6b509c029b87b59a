//! User-visible login notices: disconnect reasons and warnings.
//!
//! The server never renders localized text itself. It sends a
//! [`Notice`] whose [`translation_key`](Notice::translation_key) the
//! client (or an external translation service) turns into a sentence in
//! the player's language. The `Display` impl is an English fallback used
//! for logs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A translatable message shown to a player during or right after login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", rename_all = "snake_case")]
pub enum Notice {
    /// The login did not finish within the tick budget.
    SlowLogin,

    /// The authentication service did not recognise the session.
    UnverifiedUsername,

    /// The authentication service could not be reached.
    AuthServersDown,

    /// The client spoke out of turn or sent a bad encryption response.
    ProtocolError,

    /// A login-time query response nobody asked for.
    UnexpectedQueryResponse,

    /// Loading the player's data failed during login.
    DatabaseError,

    /// The player reached the game but no pre-loaded data was found.
    LoadingStateError,

    /// A login worker crashed.
    InternalError,

    /// The client's protocol is older than the server's.
    OutdatedClient { server_version: String },

    /// The client's protocol is newer than (or otherwise unlike) the server's.
    IncompatibleClient { server_version: String },

    /// The server has no free player slots.
    ServerFull,

    /// The player is banned.
    Banned { reason: String },

    /// The same player logged in again on another connection.
    DuplicateLogin,

    /// Free-form text supplied by an external admission check.
    Literal { text: String },
}

impl Notice {
    /// The key a client-side translator looks up.
    pub fn translation_key(&self) -> &'static str {
        match self {
            Self::SlowLogin => "multiplayer.disconnect.slow_login",
            Self::UnverifiedUsername => {
                "multiplayer.disconnect.unverified_username"
            }
            Self::AuthServersDown => "multiplayer.disconnect.authservers_down",
            Self::ProtocolError => "disconnect.genericReason",
            Self::UnexpectedQueryResponse => {
                "multiplayer.disconnect.unexpected_query_response"
            }
            Self::DatabaseError => "gatehold.loading.database-error",
            Self::LoadingStateError => "gatehold.loading.state-error",
            Self::InternalError => "disconnect.genericReason",
            Self::OutdatedClient { .. } => {
                "multiplayer.disconnect.outdated_client"
            }
            Self::IncompatibleClient { .. } => {
                "multiplayer.disconnect.incompatible"
            }
            Self::ServerFull => "multiplayer.disconnect.server_full",
            Self::Banned { .. } => "multiplayer.disconnect.banned.reason",
            Self::DuplicateLogin => "multiplayer.disconnect.duplicate_login",
            Self::Literal { .. } => "",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlowLogin => write!(f, "Took too long to log in"),
            Self::UnverifiedUsername => write!(f, "Failed to verify username"),
            Self::AuthServersDown => write!(
                f,
                "Authentication servers are down, please try again later"
            ),
            Self::ProtocolError => write!(f, "Protocol error"),
            Self::UnexpectedQueryResponse => {
                write!(f, "Unexpected custom data from client")
            }
            Self::DatabaseError => write!(
                f,
                "A database error occurred whilst loading permissions data"
            ),
            Self::LoadingStateError => write!(
                f,
                "Permissions data could not be loaded, please try again later"
            ),
            Self::InternalError => write!(f, "Internal server error"),
            Self::OutdatedClient { server_version } => {
                write!(f, "Outdated client! Please use {server_version}")
            }
            Self::IncompatibleClient { server_version } => {
                write!(f, "Incompatible client! Please use {server_version}")
            }
            Self::ServerFull => write!(f, "The server is full"),
            Self::Banned { reason } => {
                write!(f, "You are banned from this server: {reason}")
            }
            Self::DuplicateLogin => {
                write!(f, "You logged in from another location")
            }
            Self::Literal { text } => f.write_str(text),
        }
    }
}
