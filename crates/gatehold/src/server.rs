//! `GateholdServer` builder and accept loop.
//!
//! This is the entry point for running a Gatehold login server. It ties
//! together all the layers: transport → login → negotiation → session.

use std::sync::Arc;

use gatehold_login::{
    Authenticator, CustomQueryHandler, KeyExchange, LoginConfig, LoginServices,
    OfflineAuthenticator,
};
use gatehold_negotiation::{
    DEFAULT_MAX_WORKERS, NegotiationDispatcher, NegotiationParticipant, WorkerPool,
};
use gatehold_session::{
    BroadcastEventBus, ConnectionLifecycle, LifecycleConfig, LoginEvent, MemoryUserStore,
    UserStore,
};
use gatehold_tick::TickConfig;
use gatehold_transport::WebSocketTransport;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::GateholdError;
use crate::handler::handle_connection;
use crate::players::OnlinePlayers;

/// Everything configurable about a server, in one deserializable struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind: String,
    /// Player slots. Logins beyond this are refused as "server full".
    pub max_players: usize,
    /// Background tasks (authentication, data loads) that may run at once.
    pub max_workers: usize,
    pub login: LoginConfig,
    pub lifecycle: LifecycleConfig,
    pub tick: TickConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:25565".to_string(),
            max_players: 20,
            max_workers: DEFAULT_MAX_WORKERS,
            login: LoginConfig::default(),
            lifecycle: LifecycleConfig::default(),
            tick: TickConfig::default(),
        }
    }
}

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks.
pub(crate) struct ServerState<S, A: Authenticator> {
    pub(crate) services: Arc<LoginServices<A>>,
    pub(crate) players: Arc<OnlinePlayers<S>>,
    pub(crate) tick: TickConfig,
}

/// Builder for configuring and starting a Gatehold server.
///
/// # Example
///
/// ```rust,ignore
/// use gatehold::prelude::*;
///
/// let server = GateholdServer::builder()
///     .bind("0.0.0.0:25565")
///     .store(Arc::new(my_store))
///     .authenticator(my_auth)
///     .key_exchange(Arc::new(my_keys))
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct GateholdServerBuilder<S = MemoryUserStore, A = OfflineAuthenticator> {
    config: ServerConfig,
    store: Arc<S>,
    authenticator: Arc<A>,
    key_exchange: Option<Arc<dyn KeyExchange>>,
    query_handler: Option<Arc<dyn CustomQueryHandler>>,
    participants: Vec<Arc<dyn NegotiationParticipant>>,
}

impl GateholdServerBuilder {
    /// Creates a new builder: offline authenticator, in-memory player
    /// data, default config.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            store: Arc::new(MemoryUserStore::new()),
            authenticator: Arc::new(OfflineAuthenticator),
            key_exchange: None,
            query_handler: None,
            participants: Vec::new(),
        }
    }
}

impl Default for GateholdServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: UserStore, A: Authenticator> GateholdServerBuilder<S, A> {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    pub fn login_config(mut self, config: LoginConfig) -> Self {
        self.config.login = config;
        self
    }

    pub fn lifecycle_config(mut self, config: LifecycleConfig) -> Self {
        self.config.lifecycle = config;
        self
    }

    pub fn tick_config(mut self, config: TickConfig) -> Self {
        self.config.tick = config;
        self
    }

    pub fn max_players(mut self, max_players: usize) -> Self {
        self.config.max_players = max_players;
        self
    }

    /// Uses `store` for player data.
    pub fn store<S2: UserStore>(self, store: Arc<S2>) -> GateholdServerBuilder<S2, A> {
        GateholdServerBuilder {
            config: self.config,
            store,
            authenticator: self.authenticator,
            key_exchange: self.key_exchange,
            query_handler: self.query_handler,
            participants: self.participants,
        }
    }

    /// Uses `authenticator` to verify online-mode sessions.
    pub fn authenticator<A2: Authenticator>(self, authenticator: A2) -> GateholdServerBuilder<S, A2> {
        GateholdServerBuilder {
            config: self.config,
            store: self.store,
            authenticator: Arc::new(authenticator),
            key_exchange: self.key_exchange,
            query_handler: self.query_handler,
            participants: self.participants,
        }
    }

    pub fn key_exchange(mut self, keys: Arc<dyn KeyExchange>) -> Self {
        self.key_exchange = Some(keys);
        self
    }

    pub fn query_handler(mut self, handler: Arc<dyn CustomQueryHandler>) -> Self {
        self.query_handler = Some(handler);
        self
    }

    /// Adds a negotiation participant. The player-data loader is always
    /// registered first; extra participants follow in the order added.
    pub fn participant(mut self, participant: Arc<dyn NegotiationParticipant>) -> Self {
        self.participants.push(participant);
        self
    }

    /// Binds the listener and wires every layer together.
    pub async fn build(self) -> Result<GateholdServer<S, A>, GateholdError> {
        let config = self.config;
        let events = Arc::new(BroadcastEventBus::default());
        let lifecycle =
            ConnectionLifecycle::new(self.store, events.clone(), config.lifecycle.clone());

        let mut dispatcher = NegotiationDispatcher::new(WorkerPool::new(config.max_workers));
        dispatcher.register(Arc::new(lifecycle.clone()));
        for participant in self.participants {
            dispatcher.register(participant);
        }

        let players = Arc::new(OnlinePlayers::new(lifecycle, config.max_players));

        let mut services = LoginServices::new(
            config.login.clone(),
            self.authenticator,
            players.clone(),
            Arc::new(dispatcher),
        );
        if let Some(keys) = self.key_exchange {
            services = services.with_key_exchange(keys);
        }
        if let Some(handler) = self.query_handler {
            services = services.with_query_handler(handler);
        }

        let transport = WebSocketTransport::bind(&config.bind).await?;

        let state = Arc::new(ServerState {
            services: Arc::new(services),
            players,
            tick: config.tick.clone().validated(),
        });

        Ok(GateholdServer {
            transport,
            state,
            events,
        })
    }
}

/// A running Gatehold server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct GateholdServer<S = MemoryUserStore, A: Authenticator = OfflineAuthenticator> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, A>>,
    events: Arc<BroadcastEventBus>,
}

impl GateholdServer {
    /// Creates a new builder.
    pub fn builder() -> GateholdServerBuilder {
        GateholdServerBuilder::new()
    }
}

impl<S: UserStore, A: Authenticator> GateholdServer<S, A> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The online player table.
    pub fn players(&self) -> Arc<OnlinePlayers<S>> {
        Arc::clone(&self.state.players)
    }

    /// Login events (`LoginProcessed`, `ContextUpdateRequested`) from now
    /// on.
    pub fn subscribe(&self) -> broadcast::Receiver<LoginEvent> {
        self.events.subscribe()
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), GateholdError> {
        tracing::info!(
            online_mode = self.state.services.config().online_mode,
            max_players = self.state.players.max_players(),
            "Gatehold server running"
        );

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
