//! The seams between the login state machine and the rest of the server.
//!
//! The machine never talks to the authentication service, the key pair,
//! or the online player list directly. It goes through these traits, all
//! bundled into one shared [`LoginServices`].

use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use gatehold_negotiation::{NegotiationDispatcher, NegotiationId, WorkerPool};
use gatehold_protocol::{Identity, Notice, ProtocolError, Uuid};
use gatehold_transport::{CipherPair, LoginConnection};

use crate::{LoginConfig, LoginError};

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// What the authentication service said about a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The session is genuine. The identity carries the authoritative id
    /// and the name with its canonical capitalisation.
    Verified(Identity),
    /// The service does not know this session.
    Rejected,
}

/// Asks the authentication service whether a client really owns the
/// account it claims.
///
/// An unreachable service is reported as
/// `Err(`[`LoginError::AuthUnavailable`]`)`. Any other error is treated as
/// a crash of the authentication worker.
///
/// Calls run on the worker pool, never on the tick.
pub trait Authenticator: Send + Sync + 'static {
    /// `server_id` is the digest produced by
    /// [`KeyExchange::server_id_digest`]. `address` is only passed when
    /// proxy connections are being prevented.
    fn has_joined(
        &self,
        username: &str,
        server_id: &str,
        address: Option<IpAddr>,
    ) -> impl Future<Output = Result<Verification, LoginError>> + Send;
}

/// The authenticator for servers without one. Every call reports the
/// service as unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAuthenticator;

impl Authenticator for OfflineAuthenticator {
    async fn has_joined(
        &self,
        _username: &str,
        _server_id: &str,
        _address: Option<IpAddr>,
    ) -> Result<Verification, LoginError> {
        Err(LoginError::AuthUnavailable(
            "no authentication service configured".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Key exchange
// ---------------------------------------------------------------------------

/// The server's key pair and the cipher construction built on it.
pub trait KeyExchange: Send + Sync + 'static {
    /// Encoded public key sent in the encryption request.
    fn public_key(&self) -> &[u8];

    /// Decrypts bytes the client encrypted with the public key.
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, ProtocolError>;

    /// The server-id digest the client also computed and sent to the
    /// authentication service.
    fn server_id_digest(&self, server_id: &str, shared_secret: &[u8]) -> String;

    /// Builds the session ciphers from the shared secret.
    fn session_ciphers(&self, shared_secret: &[u8]) -> Result<CipherPair, ProtocolError>;
}

// ---------------------------------------------------------------------------
// Player list
// ---------------------------------------------------------------------------

/// The server's view of who is in the game.
pub trait PlayerList: Send + Sync + 'static {
    /// Admission check run when a login is ready to be accepted.
    /// `Err` carries the disconnect reason.
    fn can_login(&self, address: Option<SocketAddr>, identity: &Identity) -> Result<(), Notice>;

    /// Whether a session for `id` is still in the game.
    fn is_online(&self, id: Uuid) -> bool;

    /// Asks the session for `id` to leave because the same player logged
    /// in again.
    fn kick_duplicate(&self, id: Uuid);

    /// Puts the player into the game. `attempt` is the negotiation that
    /// preloaded their data.
    fn place_player(
        &self,
        conn: Arc<dyn LoginConnection>,
        identity: &Identity,
        attempt: NegotiationId,
    );
}

/// Handles answers to login-time custom queries.
pub trait CustomQueryHandler: Send + Sync + 'static {
    /// Returns `true` if the response was expected and consumed.
    fn handle_response(
        &self,
        conn: &dyn LoginConnection,
        transaction_id: u32,
        data: Option<&[u8]>,
    ) -> bool;
}

// ---------------------------------------------------------------------------
// LoginServices
// ---------------------------------------------------------------------------

/// Everything a login state machine needs, shared by every connection.
///
/// ```rust,ignore
/// let services = LoginServices::new(config, Arc::new(authenticator), players, dispatcher)
///     .with_key_exchange(Arc::new(keys));
/// ```
pub struct LoginServices<A = OfflineAuthenticator> {
    config: LoginConfig,
    authenticator: Arc<A>,
    key_exchange: Option<Arc<dyn KeyExchange>>,
    players: Arc<dyn PlayerList>,
    dispatcher: Arc<NegotiationDispatcher>,
    pool: WorkerPool,
    query_handler: Option<Arc<dyn CustomQueryHandler>>,
}

impl<A> Clone for LoginServices<A> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            authenticator: Arc::clone(&self.authenticator),
            key_exchange: self.key_exchange.clone(),
            players: Arc::clone(&self.players),
            dispatcher: Arc::clone(&self.dispatcher),
            pool: self.pool.clone(),
            query_handler: self.query_handler.clone(),
        }
    }
}

impl LoginServices<OfflineAuthenticator> {
    /// Services for an offline-mode server: no key exchange, no
    /// authentication.
    pub fn offline(players: Arc<dyn PlayerList>, dispatcher: Arc<NegotiationDispatcher>) -> Self {
        Self::new(
            LoginConfig::offline(),
            Arc::new(OfflineAuthenticator),
            players,
            dispatcher,
        )
    }
}

impl<A: Authenticator> LoginServices<A> {
    /// The authentication worker runs on the dispatcher's pool.
    pub fn new(
        config: LoginConfig,
        authenticator: Arc<A>,
        players: Arc<dyn PlayerList>,
        dispatcher: Arc<NegotiationDispatcher>,
    ) -> Self {
        let pool = dispatcher.pool().clone();
        Self {
            config,
            authenticator,
            key_exchange: None,
            players,
            dispatcher,
            pool,
            query_handler: None,
        }
    }

    pub fn with_key_exchange(mut self, keys: Arc<dyn KeyExchange>) -> Self {
        self.key_exchange = Some(keys);
        self
    }

    pub fn with_query_handler(mut self, handler: Arc<dyn CustomQueryHandler>) -> Self {
        self.query_handler = Some(handler);
        self
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    pub fn authenticator(&self) -> &Arc<A> {
        &self.authenticator
    }

    pub fn key_exchange(&self) -> Option<&Arc<dyn KeyExchange>> {
        self.key_exchange.as_ref()
    }

    pub fn players(&self) -> &Arc<dyn PlayerList> {
        &self.players
    }

    pub fn dispatcher(&self) -> &Arc<NegotiationDispatcher> {
        &self.dispatcher
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn query_handler(&self) -> Option<&Arc<dyn CustomQueryHandler>> {
        self.query_handler.as_ref()
    }
}

impl<A> fmt::Debug for LoginServices<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginServices")
            .field("config", &self.config)
            .field("key_exchange", &self.key_exchange.is_some())
            .field("query_handler", &self.query_handler.is_some())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_authenticator_is_always_unavailable() {
        let result = OfflineAuthenticator.has_joined("Alice", "", None).await;
        assert!(matches!(result, Err(LoginError::AuthUnavailable(_))));
    }
}
