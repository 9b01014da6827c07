use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::auth::AuthConfig;
use crate::config::ServerConfig;
use crate::coordinator::Coordinator;
use crate::registry::SessionRegistry;
use crate::store::LobbyStore;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn LobbyStore>,
    pub auth: AuthConfig,
    pub config: Arc<ServerConfig>,
    pub ws_connection_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn LobbyStore>) -> Self {
        let auth = AuthConfig {
            admin_token: config.auth.admin_token.clone(),
        };
        let registry = Arc::new(SessionRegistry::new());
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            config.lobbies.max_teams_per_lobby,
        ));
        Self {
            coordinator,
            registry,
            store,
            auth,
            config: Arc::new(config),
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Counts an open WebSocket for as long as it lives.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
