//! Lifecycle configuration.

use serde::{Deserialize, Serialize};

use crate::ContextSet;

/// Switches that shape how logins are processed.
///
/// Both flags default to off. Loading these from a file is up to the
/// host; the struct only needs to deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Log every stage of every login at `info` instead of `debug`.
    pub debug_logins: bool,

    /// Refuse a login whose data failed to load, and disconnect a player
    /// who reaches the game without data. When off, such players get in
    /// with no permissions and a warning.
    pub cancel_failed_logins: bool,

    /// Contexts every player starts with, e.g. `server=lobby`.
    pub static_contexts: ContextSet,
}
