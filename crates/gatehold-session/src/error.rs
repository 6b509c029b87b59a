//! Error types for the session layer.

use gatehold_protocol::Uuid;

/// Errors raised while loading or tracking player data.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The backing store could not be reached or returned garbage.
    #[error("storage backend failed: {0}")]
    Storage(String),

    /// The store has no record for this player and cannot create one.
    #[error("no data stored for player {0}")]
    NotFound(Uuid),

    /// The player's data was not loaded when it was needed.
    #[error("data for player {0} is not loaded")]
    NotLoaded(Uuid),
}
