//! The online player table.
//!
//! [`OnlinePlayers`] is the default [`PlayerList`]: it runs the admission
//! checks (bans, capacity), hangs the permission view on every placed
//! player, and releases their data when they leave.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use gatehold_login::PlayerList;
use gatehold_negotiation::NegotiationId;
use gatehold_protocol::{Identity, Notice, ServerPacket, Uuid};
use gatehold_session::{ConnectionLifecycle, PermissionHolder, Tristate, UserStore};
use gatehold_transport::{ConnectionId, LoginConnection};

/// A player in the game.
pub struct OnlinePlayer {
    identity: Identity,
    conn: Arc<dyn LoginConnection>,
    permissions: PermissionHolder,
}

impl OnlinePlayer {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.conn.id()
    }

    pub fn permissions(&self) -> &PermissionHolder {
        &self.permissions
    }
}

impl fmt::Debug for OnlinePlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnlinePlayer")
            .field("identity", &self.identity)
            .field("conn_id", &self.conn.id())
            .finish_non_exhaustive()
    }
}

/// Everyone currently in the game, keyed by canonical id.
pub struct OnlinePlayers<S> {
    lifecycle: ConnectionLifecycle<S>,
    players: DashMap<Uuid, OnlinePlayer>,
    bans: DashMap<Uuid, String>,
    max_players: usize,
}

impl<S: UserStore> OnlinePlayers<S> {
    pub fn new(lifecycle: ConnectionLifecycle<S>, max_players: usize) -> Self {
        Self {
            lifecycle,
            players: DashMap::new(),
            bans: DashMap::new(),
            max_players,
        }
    }

    pub fn lifecycle(&self) -> &ConnectionLifecycle<S> {
        &self.lifecycle
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// The identity of the online player `id`.
    pub fn get(&self, id: Uuid) -> Option<Identity> {
        self.players.get(&id).map(|p| p.identity.clone())
    }

    /// Refuses future logins of `id` with `reason`. Does not kick a
    /// player who is already online.
    pub fn ban(&self, id: Uuid, reason: impl Into<String>) {
        self.bans.insert(id, reason.into());
    }

    pub fn unban(&self, id: Uuid) -> bool {
        self.bans.remove(&id).is_some()
    }

    /// Looks up `permission` for the online player `id`. Unknown players
    /// and players without data get [`Tristate::Undefined`].
    pub fn check_permission(&self, id: Uuid, permission: &str) -> Tristate {
        self.players
            .get(&id)
            .map_or(Tristate::Undefined, |p| p.permissions.check_permission(permission))
    }

    pub fn has_permission(&self, id: Uuid, permission: &str) -> bool {
        self.check_permission(id, permission).as_bool()
    }

    /// Removes the player `id` if they are still on connection `conn_id`,
    /// and releases their data.
    ///
    /// Returns `false` if the entry was already gone or belongs to a newer
    /// connection of the same player.
    pub fn remove(&self, id: Uuid, conn_id: ConnectionId) -> bool {
        let Some((_, player)) = self
            .players
            .remove_if(&id, |_, p| p.conn.id() == conn_id)
        else {
            return false;
        };
        tracing::info!("{} left the game", player.identity.name);
        self.lifecycle.on_disconnect(&player.identity);
        true
    }
}

impl<S: UserStore> PlayerList for OnlinePlayers<S> {
    fn can_login(&self, address: Option<SocketAddr>, identity: &Identity) -> Result<(), Notice> {
        let id = identity.canonical_id();
        if let Some(reason) = self.bans.get(&id) {
            tracing::debug!(player = %identity, ?address, "banned player refused");
            return Err(Notice::Banned {
                reason: reason.clone(),
            });
        }
        if self.players.len() >= self.max_players && !self.players.contains_key(&id) {
            return Err(Notice::ServerFull);
        }
        Ok(())
    }

    fn is_online(&self, id: Uuid) -> bool {
        self.players.contains_key(&id)
    }

    fn kick_duplicate(&self, id: Uuid) {
        let Some(player) = self.players.get(&id) else {
            return;
        };
        let notice = Notice::DuplicateLogin;
        tracing::info!("Disconnecting {}: {}", player.identity.name, notice);
        if let Err(e) = player.conn.send(ServerPacket::Disconnect {
            reason: notice.clone(),
        }) {
            tracing::debug!(conn_id = %player.conn.id(), error = %e, "failed to send disconnect");
        }
        if let Err(e) = player.conn.close(&notice) {
            tracing::debug!(conn_id = %player.conn.id(), error = %e, "failed to close connection");
        }
    }

    fn place_player(
        &self,
        conn: Arc<dyn LoginConnection>,
        identity: &Identity,
        attempt: NegotiationId,
    ) {
        let permissions = self.lifecycle.on_post_accept(identity, attempt, conn.as_ref());

        // A hard post-accept failure already closed the connection.
        if !conn.is_open() {
            self.lifecycle.on_disconnect(identity);
            return;
        }

        tracing::info!("{} joined the game", identity.name);
        self.players.insert(
            identity.canonical_id(),
            OnlinePlayer {
                identity: identity.clone(),
                conn,
                permissions,
            },
        );
    }
}

impl<S> fmt::Debug for OnlinePlayers<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnlinePlayers")
            .field("online", &self.players.len())
            .field("max_players", &self.max_players)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehold_session::{
        BroadcastEventBus, LifecycleConfig, MemoryUserStore, PermissionNode, UserRecord,
    };
    use gatehold_transport::MemoryConnection;

    fn table(max_players: usize) -> (OnlinePlayers<MemoryUserStore>, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        let lifecycle = ConnectionLifecycle::new(
            Arc::clone(&store),
            Arc::new(BroadcastEventBus::default()),
            LifecycleConfig::default(),
        );
        (OnlinePlayers::new(lifecycle, max_players), store)
    }

    fn conn() -> (Arc<MemoryConnection>, Arc<dyn LoginConnection>) {
        let mem = Arc::new(MemoryConnection::loopback());
        let conn: Arc<dyn LoginConnection> = mem.clone();
        (mem, conn)
    }

    #[test]
    fn test_place_and_remove() {
        let (players, _) = table(10);
        let alice = Identity::fallback("Alice");
        let (_, c) = conn();
        let conn_id = c.id();

        players.place_player(c, &alice, NegotiationId::new(1));
        assert!(players.is_online(alice.canonical_id()));
        assert_eq!(players.get(alice.canonical_id()), Some(alice.clone()));

        assert!(players.remove(alice.canonical_id(), conn_id));
        assert!(!players.is_online(alice.canonical_id()));
        assert!(!players.remove(alice.canonical_id(), conn_id));
    }

    #[test]
    fn test_remove_ignores_stale_connection() {
        let (players, _) = table(10);
        let alice = Identity::fallback("Alice");
        let (_, old) = conn();
        let old_id = old.id();
        let (_, new) = conn();

        players.place_player(old, &alice, NegotiationId::new(1));
        players.place_player(new, &alice, NegotiationId::new(2));

        assert!(!players.remove(alice.canonical_id(), old_id));
        assert!(players.is_online(alice.canonical_id()));
    }

    #[test]
    fn test_banned_player_is_refused() {
        let (players, _) = table(10);
        let alice = Identity::fallback("Alice");
        players.ban(alice.canonical_id(), "griefing");

        assert_eq!(
            players.can_login(None, &alice),
            Err(Notice::Banned {
                reason: "griefing".into()
            })
        );
        assert!(players.unban(alice.canonical_id()));
        assert_eq!(players.can_login(None, &alice), Ok(()));
    }

    #[test]
    fn test_full_server_refuses_newcomers_only() {
        let (players, _) = table(1);
        let alice = Identity::fallback("Alice");
        players.place_player(conn().1, &alice, NegotiationId::new(1));

        assert_eq!(
            players.can_login(None, &Identity::fallback("Bob")),
            Err(Notice::ServerFull)
        );
        assert_eq!(players.can_login(None, &alice), Ok(()));
    }

    #[test]
    fn test_kick_duplicate_closes_old_connection() {
        let (players, _) = table(10);
        let alice = Identity::fallback("Alice");
        let (mem, c) = conn();
        players.place_player(c, &alice, NegotiationId::new(1));
        mem.take_sent();

        players.kick_duplicate(alice.canonical_id());

        assert_eq!(
            mem.take_sent(),
            vec![ServerPacket::Disconnect {
                reason: Notice::DuplicateLogin
            }]
        );
        assert!(!mem.is_open());
        assert!(players.is_online(alice.canonical_id()), "entry leaves with its connection");
    }

    #[tokio::test]
    async fn test_permissions_follow_loaded_data() {
        use gatehold_negotiation::{NegotiationDispatcher, NegotiationStatus, WorkerPool};

        let (players, store) = table(10);
        let alice = Identity::fallback("Alice");
        store.insert(
            UserRecord::new(alice.canonical_id(), "Alice")
                .with_node(PermissionNode::new("chat.*", true))
                .with_node(PermissionNode::new("chat.mute", false)),
        );

        let mut dispatcher = NegotiationDispatcher::new(WorkerPool::new(1));
        dispatcher.register(Arc::new(players.lifecycle().clone()));
        let (_, c) = conn();
        let mut negotiation = dispatcher.dispatch(alice.clone(), &c);
        while negotiation.poll() == NegotiationStatus::Pending {
            tokio::task::yield_now().await;
        }

        let attempt = negotiation.id();
        players.place_player(c, &alice, attempt);
        let id = alice.canonical_id();
        assert!(players.has_permission(id, "chat.send"));
        assert_eq!(players.check_permission(id, "chat.mute"), Tristate::False);
        assert_eq!(players.check_permission(id, "build"), Tristate::Undefined);
        assert_eq!(
            players.check_permission(Uuid::nil(), "chat.send"),
            Tristate::Undefined
        );
    }
}
