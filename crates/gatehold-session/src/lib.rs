//! Player data and session lifecycle for Gatehold.
//!
//! This crate makes sure a player's data is in memory *before* they enter
//! the game, and gone after they leave:
//!
//! - **Coordinator** ([`ConnectionLifecycle`]): the negotiation participant
//!   that loads data during login, plus the post-accept and disconnect
//!   hooks.
//! - **Table** ([`SessionTable`]): per-identity records, pending login
//!   attempts, and query-context caches.
//! - **Store** ([`UserStore`] trait, [`MemoryUserStore`]): where data comes
//!   from.
//! - **Permissions** ([`UserRecord`], [`PermissionHolder`], [`Tristate`]):
//!   what the data is used for.
//! - **Events** ([`EventBus`], [`BroadcastEventBus`]): `LoginProcessed` and
//!   `ContextUpdateRequested` notifications.

mod config;
mod error;
mod events;
mod lifecycle;
mod permission;
mod store;
mod table;

pub use config::LifecycleConfig;
pub use error::SessionError;
pub use events::{BroadcastEventBus, EventBus, LoginEvent};
pub use lifecycle::ConnectionLifecycle;
pub use permission::{
    ContextSet, PermissionHolder, PermissionNode, QueryContextCache, Tristate, UserRecord,
};
pub use store::{MemoryUserStore, UserStore};
pub use table::SessionTable;
