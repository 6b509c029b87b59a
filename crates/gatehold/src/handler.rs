//! Per-connection handler: handshake screening, the login loop, and the
//! player's time in the game.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → screen version and intention
//!   2. Pump the login state machine: packets as they arrive, ticks on
//!      the tick clock
//!   3. Placed → hold the player's slot until the connection goes away

use std::sync::Arc;
use std::time::Duration;

use gatehold_login::{Authenticator, LoginError, LoginStateMachine, screen_handshake};
use gatehold_protocol::{Intention, Notice, ProtocolError, ServerPacket, Uuid};
use gatehold_session::UserStore;
use gatehold_tick::TickScheduler;
use gatehold_transport::{ConnectionId, LoginConnection, TransportError, WebSocketConnection};

use crate::GateholdError;
use crate::players::OnlinePlayers;
use crate::server::ServerState;

/// How long a fresh connection may take to send its handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drop guard that removes a placed player when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Removal is
/// keyed by connection, so a guard of a kicked session never removes the
/// session that replaced it.
struct PlayerGuard<S: UserStore> {
    players: Arc<OnlinePlayers<S>>,
    id: Uuid,
    conn_id: ConnectionId,
}

impl<S: UserStore> Drop for PlayerGuard<S> {
    fn drop(&mut self) {
        self.players.remove(self.id, self.conn_id);
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, A>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, A>>,
) -> Result<(), GateholdError>
where
    S: UserStore,
    A: Authenticator,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: Handshake ---
    match screen(&conn, &state).await? {
        Intention::Login => {}
        Intention::Status => {
            tracing::debug!(%conn_id, "status requests are not served");
            conn.close(&Notice::Literal {
                text: "status requests are not served".into(),
            })?;
            return Ok(());
        }
    }

    // --- Step 2: Login ---
    let dyn_conn: Arc<dyn LoginConnection> = conn.clone();
    let mut machine = LoginStateMachine::new(Arc::clone(&state.services), dyn_conn);
    let mut ticker = TickScheduler::new(state.tick.clone());

    while !machine.phase().is_terminal() {
        tokio::select! {
            received = conn.recv() => match received {
                Ok(Some(packet)) => {
                    if let Err(e) = machine.handle_packet(packet) {
                        tracing::debug!(%conn_id, error = %e, "login failed");
                    }
                }
                Ok(None) => machine.on_connection_lost("Disconnected"),
                Err(e) => machine.on_connection_lost(&e.to_string()),
            },
            _ = ticker.wait_for_tick() => {
                machine.tick();
                ticker.record_tick_end();
            }
        }
    }

    if !machine.is_placed() {
        return Ok(());
    }
    let Some(id) = machine.identity().map(|identity| identity.canonical_id()) else {
        return Ok(());
    };

    // --- Step 3: In game ---
    let _guard = PlayerGuard {
        players: Arc::clone(&state.players),
        id,
        conn_id,
    };
    let name = machine.describe();

    loop {
        tokio::select! {
            received = conn.recv() => match received {
                Ok(Some(packet)) => {
                    tracing::trace!(%conn_id, packet = packet.kind(), "ignoring login packet in game");
                }
                Ok(None) => {
                    tracing::info!("{name} lost connection: Disconnected");
                    break;
                }
                // Game packets are not ours to decode.
                Err(TransportError::Codec(_)) => {}
                Err(e) => {
                    tracing::info!("{name} lost connection: {e}");
                    break;
                }
            },
            _ = ticker.wait_for_tick() => {
                if !conn.is_open() {
                    break;
                }
            }
        }
    }

    // _guard drops here → player removed, data released.
    Ok(())
}

/// Reads the handshake and screens it. A refused client is sent the
/// reason before the connection closes.
async fn screen<S, A>(
    conn: &WebSocketConnection,
    state: &ServerState<S, A>,
) -> Result<Intention, GateholdError>
where
    A: Authenticator,
{
    let packet = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(packet))) => packet,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before handshake".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            conn.close(&Notice::SlowLogin)?;
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    match screen_handshake(state.services.config(), &packet) {
        Ok(intention) => Ok(intention),
        Err(e) => {
            refuse(conn, &e);
            Err(e.into())
        }
    }
}

fn refuse(conn: &WebSocketConnection, err: &LoginError) {
    let reason = err.notice();
    tracing::info!(conn_id = %conn.id(), %reason, "handshake refused");
    if let Err(e) = conn.send(ServerPacket::Disconnect {
        reason: reason.clone(),
    }) {
        tracing::debug!(conn_id = %conn.id(), error = %e, "failed to send disconnect");
    }
    if let Err(e) = conn.close(&reason) {
        tracing::debug!(conn_id = %conn.id(), error = %e, "failed to close connection");
    }
}
