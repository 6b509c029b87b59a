use std::sync::Arc;

use gatehold::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Player data
// ---------------------------------------------------------------------------

/// Seeds a store with a couple of offline-mode players so a fresh server
/// has something to show for `has_permission`.
fn seed_store() -> MemoryUserStore {
    let store = MemoryUserStore::new();
    store.insert(
        UserRecord::new(offline_uuid("Alice"), "Alice")
            .with_node(PermissionNode::new("chat.*", true))
            .with_node(PermissionNode::new("server.admin", true)),
    );
    store.insert(
        UserRecord::new(offline_uuid("Bob"), "Bob")
            .with_node(PermissionNode::new("chat.*", true))
            .with_node(PermissionNode::new("chat.shout", false)),
    );
    store
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0.0.0.0:25565".to_string());

    let server = GateholdServer::builder()
        .bind(&bind)
        .login_config(LoginConfig::offline())
        .store(Arc::new(seed_store()))
        .build()
        .await?;

    tracing::info!(addr = %server.local_addr()?, "offline login server listening");

    let mut events = server.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!(?event, "login event");
        }
    });

    server.run().await?;
    Ok(())
}
