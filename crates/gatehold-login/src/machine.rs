//! The per-connection login state machine.
//!
//! ```text
//! Hello ──▶ Key ──▶ Authenticating ──┐
//!   │                                ▼
//!   └──(offline / loopback)──▶ Negotiating ──▶ ReadyToAccept ──▶ Accepted
//!                                                    │              ▲
//!                                                    └─▶ DelayAccept┘
//!
//! any phase ──▶ Disconnected
//! ```
//!
//! The machine is driven from outside: [`handle_packet`] for every packet
//! the client sends, and [`tick`] once per server tick. It never blocks
//! and never awaits. Slow work (authentication, negotiation) runs on the
//! worker pool and is polled from `tick`.
//!
//! [`handle_packet`]: LoginStateMachine::handle_packet
//! [`tick`]: LoginStateMachine::tick

use std::fmt;
use std::sync::Arc;

use gatehold_negotiation::{Negotiation, NegotiationStatus, TaskHandle};
use gatehold_protocol::{ClientPacket, Identity, Notice, ProtocolError, ServerPacket, Uuid};
use gatehold_transport::LoginConnection;

use crate::auth::{auth_address, verify_identity};
use crate::{Authenticator, LoginError, LoginServices, OfflineAuthenticator};

/// Ticks a login may take before it is dropped as too slow. At 20 Hz this
/// is 30 seconds.
pub const LOGIN_TIMEOUT_TICKS: u32 = 600;

/// Server id sent in the encryption request. Modern clients expect it
/// empty.
pub const SERVER_ID: &str = "";

/// Longest name a client may claim.
const MAX_NAME_LEN: usize = 16;

/// Where a login stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPhase {
    /// Waiting for the client's `Hello`.
    Hello,
    /// Encryption requested, waiting for the client's response.
    Key,
    /// The authentication worker is running.
    Authenticating,
    /// Negotiation work is running.
    Negotiating,
    /// Negotiation finished; admission runs on the next tick.
    ReadyToAccept,
    /// Accepted, but an older session of the same player is still in the
    /// game.
    DelayAccept,
    /// The player is in the game. The machine has nothing left to do.
    Accepted,
    /// The login ended without a player.
    Disconnected,
}

impl LoginPhase {
    /// `true` once the machine no longer reacts to packets or ticks.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Disconnected)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Key => "key",
            Self::Authenticating => "authenticating",
            Self::Negotiating => "negotiating",
            Self::ReadyToAccept => "ready_to_accept",
            Self::DelayAccept => "delay_accept",
            Self::Accepted => "accepted",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for LoginPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives one connection from `Hello` to a placed player.
///
/// One machine per connection, owned by whatever ticks that connection.
/// All sends happen on the caller's thread.
pub struct LoginStateMachine<A: Authenticator = OfflineAuthenticator> {
    services: Arc<LoginServices<A>>,
    conn: Arc<dyn LoginConnection>,
    phase: LoginPhase,
    nonce: [u8; 4],
    identity: Option<Identity>,
    tick_count: u32,
    /// The accepted identity held while an older session leaves.
    pending_accept: Option<Identity>,
    auth_task: Option<TaskHandle<Result<Identity, LoginError>>>,
    negotiation: Option<Negotiation>,
    placed: bool,
}

impl<A: Authenticator> LoginStateMachine<A> {
    pub fn new(services: Arc<LoginServices<A>>, conn: Arc<dyn LoginConnection>) -> Self {
        tracing::debug!(conn_id = %conn.id(), "login started");
        Self {
            services,
            conn,
            phase: LoginPhase::Hello,
            nonce: rand::random(),
            identity: None,
            tick_count: 0,
            pending_accept: None,
            auth_task: None,
            negotiation: None,
            placed: false,
        }
    }

    pub fn phase(&self) -> LoginPhase {
        self.phase
    }

    /// The identity as far as it is known: claimed, then verified or
    /// fallback, then completed at acceptance.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    /// The nonce sent in the encryption request.
    pub fn nonce(&self) -> [u8; 4] {
        self.nonce
    }

    /// `true` once the player was handed to the player list.
    pub fn is_placed(&self) -> bool {
        self.placed
    }

    pub fn connection(&self) -> &Arc<dyn LoginConnection> {
        &self.conn
    }

    /// Who this login is, for log lines: `name (address)` once a name is
    /// known, the address alone before that.
    pub fn describe(&self) -> String {
        let addr = self
            .conn
            .remote_addr()
            .map_or_else(|| "local".to_string(), |addr| addr.to_string());
        match &self.identity {
            Some(identity) => format!("{} ({addr})", identity.name),
            None => addr,
        }
    }

    // -----------------------------------------------------------------------
    // Packets
    // -----------------------------------------------------------------------

    /// Feeds one packet from the client.
    ///
    /// On error the connection has already been disconnected with the
    /// error's notice; the error is returned for the caller's logs.
    /// Packets arriving after the login ended are ignored.
    pub fn handle_packet(&mut self, packet: ClientPacket) -> Result<(), LoginError> {
        if self.phase.is_terminal() {
            tracing::debug!(
                conn_id = %self.conn.id(),
                packet = packet.kind(),
                phase = %self.phase,
                "ignoring packet after login ended"
            );
            return Ok(());
        }

        let result = self.route_packet(packet);
        if let Err(e) = &result {
            tracing::debug!(conn_id = %self.conn.id(), error = %e, "login packet failed");
            self.disconnect(e.notice());
        }
        result
    }

    fn route_packet(&mut self, packet: ClientPacket) -> Result<(), LoginError> {
        match (self.phase, packet) {
            (LoginPhase::Hello, ClientPacket::Hello { name, id }) => self.on_hello(name, id),
            (
                LoginPhase::Key,
                ClientPacket::EncryptionResponse {
                    shared_secret,
                    nonce,
                },
            ) => self.on_key(&shared_secret, &nonce),
            (
                _,
                ClientPacket::CustomQueryResponse {
                    transaction_id,
                    data,
                },
            ) => self.on_query_response(transaction_id, data.as_deref()),
            (phase, packet) => Err(ProtocolError::UnexpectedPacket {
                packet: packet.kind(),
                phase: phase.to_string(),
            }
            .into()),
        }
    }

    fn on_hello(&mut self, name: String, id: Option<Uuid>) -> Result<(), LoginError> {
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(ProtocolError::InvalidMessage(format!("invalid player name {name:?}")).into());
        }

        let claimed = Identity::claimed(name, id);
        self.identity = Some(claimed.clone());

        if self.services.config().online_mode && !self.conn.is_loopback() {
            let keys = self
                .services
                .key_exchange()
                .ok_or(LoginError::MissingKeyExchange)?;
            self.phase = LoginPhase::Key;
            self.conn.send(ServerPacket::EncryptionRequest {
                server_id: SERVER_ID.to_string(),
                public_key: keys.public_key().to_vec(),
                nonce: self.nonce,
            })?;
            Ok(())
        } else {
            self.begin_negotiation(claimed);
            Ok(())
        }
    }

    fn on_key(&mut self, shared_secret: &[u8], nonce: &[u8]) -> Result<(), LoginError> {
        let keys = Arc::clone(
            self.services
                .key_exchange()
                .ok_or(LoginError::MissingKeyExchange)?,
        );

        if keys.decrypt(nonce)? != self.nonce {
            return Err(ProtocolError::NonceMismatch.into());
        }

        let secret = keys.decrypt(shared_secret)?;
        let server_id = keys.server_id_digest(SERVER_ID, &secret);
        let ciphers = keys.session_ciphers(&secret)?;
        self.conn.enable_encryption(ciphers)?;

        self.phase = LoginPhase::Authenticating;
        self.spawn_authentication(server_id);
        Ok(())
    }

    fn on_query_response(&mut self, transaction_id: u32, data: Option<&[u8]>) -> Result<(), LoginError> {
        let handled = self
            .services
            .query_handler()
            .is_some_and(|handler| handler.handle_response(self.conn.as_ref(), transaction_id, data));
        if handled {
            Ok(())
        } else {
            Err(LoginError::UnexpectedQueryResponse { transaction_id })
        }
    }

    fn spawn_authentication(&mut self, server_id: String) {
        let authenticator = Arc::clone(self.services.authenticator());
        let config = self.services.config().clone();
        let address = auth_address(&config, self.conn.remote_addr());
        let username = self
            .identity
            .as_ref()
            .map(|identity| identity.name.clone())
            .unwrap_or_default();

        let task = self.services.pool().spawn("authenticate", async move {
            verify_identity(authenticator.as_ref(), &config, &username, &server_id, address).await
        });
        self.auth_task = Some(task);
    }

    fn begin_negotiation(&mut self, identity: Identity) {
        self.identity = Some(identity.clone());
        self.phase = LoginPhase::Negotiating;
        let negotiation = self.services.dispatcher().dispatch(identity, &self.conn);
        self.negotiation = Some(negotiation);
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advances the login by one server tick.
    ///
    /// Polls whatever the current phase waits on, then counts the tick.
    /// A login still unfinished on its [`LOGIN_TIMEOUT_TICKS`]th tick is
    /// disconnected as too slow.
    pub fn tick(&mut self) {
        match self.phase {
            LoginPhase::Authenticating => self.poll_authentication(),
            LoginPhase::Negotiating => self.poll_negotiation(),
            LoginPhase::ReadyToAccept => self.accept(),
            LoginPhase::DelayAccept => self.poll_delayed_accept(),
            _ => {}
        }

        if self.phase.is_terminal() {
            return;
        }

        self.tick_count += 1;
        if self.tick_count >= LOGIN_TIMEOUT_TICKS {
            let err = LoginError::Timeout {
                ticks: self.tick_count,
            };
            self.disconnect(err.notice());
        }
    }

    fn poll_authentication(&mut self) {
        let settled = match self.auth_task.as_mut() {
            Some(task) => task.is_settled(),
            None => false,
        };
        if !settled {
            return;
        }

        match self.auth_task.take().and_then(TaskHandle::into_settled) {
            Some(Ok(Ok(identity))) => self.begin_negotiation(identity),
            Some(Ok(Err(e))) => self.disconnect(e.notice()),
            Some(Err(failure)) => self.disconnect(LoginError::Worker(failure).notice()),
            None => {}
        }
    }

    fn poll_negotiation(&mut self) {
        let Some(negotiation) = self.negotiation.as_mut() else {
            return;
        };
        match negotiation.poll() {
            NegotiationStatus::Pending => {}
            NegotiationStatus::Complete => self.phase = LoginPhase::ReadyToAccept,
            NegotiationStatus::Failed(notice) => self.disconnect(notice),
        }
    }

    fn accept(&mut self) {
        let Some(identity) = self.identity.take().map(Identity::completed) else {
            self.disconnect(Notice::InternalError);
            return;
        };
        self.identity = Some(identity.clone());

        let players = Arc::clone(self.services.players());
        if let Err(notice) = players.can_login(self.conn.remote_addr(), &identity) {
            self.disconnect(notice);
            return;
        }

        self.phase = LoginPhase::Accepted;
        if let Err(e) = self.send_login_success(&identity) {
            self.disconnect(e.notice());
            return;
        }

        let id = identity.canonical_id();
        if players.is_online(id) {
            tracing::debug!(player = %identity, "waiting for previous session to leave");
            players.kick_duplicate(id);
            self.phase = LoginPhase::DelayAccept;
            self.pending_accept = Some(identity);
        } else {
            self.place(identity);
        }
    }

    fn send_login_success(&self, identity: &Identity) -> Result<(), LoginError> {
        if let Some(threshold) = self.services.config().compression_threshold {
            if !self.conn.is_loopback() {
                self.conn.send(ServerPacket::EnableCompression { threshold })?;
                self.conn.set_compression(threshold)?;
            }
        }
        self.conn.send(ServerPacket::LoginSuccess {
            identity: identity.clone(),
        })?;
        Ok(())
    }

    fn poll_delayed_accept(&mut self) {
        let still_online = match &self.pending_accept {
            Some(identity) => self.services.players().is_online(identity.canonical_id()),
            None => return,
        };
        if still_online {
            return;
        }
        if let Some(identity) = self.pending_accept.take() {
            self.place(identity);
        }
    }

    fn place(&mut self, identity: Identity) {
        let Some(attempt) = self.negotiation.as_ref().map(Negotiation::id) else {
            self.disconnect(Notice::InternalError);
            return;
        };
        tracing::info!("{} logged in", self.describe());
        self.services
            .players()
            .place_player(Arc::clone(&self.conn), &identity, attempt);
        self.placed = true;
        self.phase = LoginPhase::Accepted;
    }

    // -----------------------------------------------------------------------
    // Disconnect
    // -----------------------------------------------------------------------

    /// Ends the login: sends `reason` (best-effort), then closes the
    /// connection. Calling it again does nothing.
    pub fn disconnect(&mut self, reason: Notice) {
        if self.phase == LoginPhase::Disconnected {
            return;
        }
        tracing::info!("Disconnecting {}: {}", self.describe(), reason);

        if let Err(e) = self.conn.send(ServerPacket::Disconnect {
            reason: reason.clone(),
        }) {
            tracing::error!(conn_id = %self.conn.id(), error = %e, "Error whilst disconnecting player");
        }
        if let Err(e) = self.conn.close(&reason) {
            tracing::debug!(conn_id = %self.conn.id(), error = %e, "failed to close connection");
        }

        self.finish();
    }

    /// The peer went away on its own.
    pub fn on_connection_lost(&mut self, reason: &str) {
        if self.phase == LoginPhase::Disconnected {
            return;
        }
        tracing::info!("{} lost connection: {}", self.describe(), reason);
        self.finish();
    }

    fn finish(&mut self) {
        self.phase = LoginPhase::Disconnected;
        self.auth_task = None;
        self.pending_accept = None;
        if !self.placed {
            if let Some(negotiation) = self.negotiation.as_mut() {
                negotiation.abandon();
            }
        }
    }
}

impl<A: Authenticator> fmt::Debug for LoginStateMachine<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginStateMachine")
            .field("conn_id", &self.conn.id())
            .field("phase", &self.phase)
            .field("identity", &self.identity)
            .field("tick_count", &self.tick_count)
            .field("placed", &self.placed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(LoginPhase::Accepted.is_terminal());
        assert!(LoginPhase::Disconnected.is_terminal());
        assert!(!LoginPhase::DelayAccept.is_terminal());
        assert!(!LoginPhase::Hello.is_terminal());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(LoginPhase::ReadyToAccept.to_string(), "ready_to_accept");
    }
}
