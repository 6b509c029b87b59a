//! # Gatehold
//!
//! A login gatekeeper for game servers.
//!
//! Gatehold stands between a freshly accepted connection and the game:
//! it screens the handshake, runs the key exchange and authentication,
//! preloads the player's data while other subsystems have their say, and
//! only then lets the player in. Logins that stall are dropped after 600
//! ticks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gatehold::prelude::*;
//!
//! # async fn run() -> Result<(), GateholdError> {
//! let server = GateholdServer::builder()
//!     .bind("0.0.0.0:25565")
//!     .login_config(LoginConfig::offline())
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod players;
mod server;

pub use error::GateholdError;
pub use players::{OnlinePlayer, OnlinePlayers};
pub use server::{GateholdServer, GateholdServerBuilder, ServerConfig};

/// Re-exports everything a server host usually needs.
pub mod prelude {
    pub use crate::{
        GateholdError, GateholdServer, GateholdServerBuilder, OnlinePlayer, OnlinePlayers,
        ServerConfig,
    };
    pub use gatehold_login::{
        Authenticator, CustomQueryHandler, KeyExchange, LoginConfig, LoginError, PlayerList,
        Verification,
    };
    pub use gatehold_negotiation::{
        NegotiationError, NegotiationParticipant, NegotiationTicket, TaskHandle,
    };
    pub use gatehold_protocol::{
        ClientPacket, Identity, Intention, Notice, ServerPacket, Uuid, offline_uuid,
    };
    pub use gatehold_session::{
        ContextSet, LifecycleConfig, LoginEvent, MemoryUserStore, PermissionNode, SessionError,
        Tristate, UserRecord, UserStore,
    };
    pub use gatehold_tick::TickConfig;
    pub use gatehold_transport::{CipherPair, StreamCipher};
}
