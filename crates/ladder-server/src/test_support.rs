//! Fixtures shared by the unit tests.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use ladder_core::net::messages::ServerMessage;
use ladder_core::net::protocol::decode_server_message;
use ladder_core::player::{Affiliation, Role};
use ladder_core::test_helpers::scenario_puzzle;

use crate::coordinator::Coordinator;
use crate::registry::{ConnectionHandle, SessionRegistry};
use crate::store::{LobbyStore, MemoryStore};

/// Lobby 1 plays the `START -> FINAL` ladder with teams Red (10: a1, a2)
/// and Blue (11: b1) plus unassigned u1. Lobby 2 has team 20 with x1.
pub(crate) fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_lobby(1, "Friday", scenario_puzzle()).unwrap();
    store.insert_team(10, 1, "Red").unwrap();
    store.insert_team(11, 1, "Blue").unwrap();
    store.insert_player("a1", 1, Some(10), "Ann").unwrap();
    store.insert_player("a2", 1, Some(10), "Abe").unwrap();
    store.insert_player("b1", 1, Some(11), "Ben").unwrap();
    store.insert_player("u1", 1, None, "Uma").unwrap();
    store.insert_lobby(2, "Saturday", scenario_puzzle()).unwrap();
    store.insert_team(20, 2, "Green").unwrap();
    store.insert_player("x1", 2, Some(20), "Xia").unwrap();
    store
}

pub(crate) struct Harness {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) coordinator: Arc<Coordinator>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_store(Arc::new(seeded_store()))
    }

    pub(crate) fn with_store(store: Arc<MemoryStore>) -> Self {
        let dyn_store: Arc<dyn LobbyStore> = Arc::clone(&store) as Arc<dyn LobbyStore>;
        let registry = Arc::new(SessionRegistry::new());
        Self {
            store,
            coordinator: Arc::new(Coordinator::new(dyn_store, registry, 10)),
        }
    }

    /// A harness whose lobby 1 game is already in progress.
    pub(crate) async fn started() -> Self {
        let h = Self::new();
        h.coordinator.start_game(1, None).await.unwrap();
        h
    }

    /// Register a player connection affiliated the way the store says.
    pub(crate) async fn connect(&self, psid: &str) -> (ConnectionHandle, mpsc::Receiver<Bytes>) {
        let record = self.store.find_player(psid).unwrap();
        let affiliation = Affiliation {
            player_session_id: psid.to_string(),
            lobby_id: record.lobby_id,
            team_id: record.team_id,
            role: Role::Player,
        };
        let (tx, rx) = mpsc::channel(64);
        let handle = self.coordinator.registry().register(&affiliation, tx).await;
        (handle, rx)
    }

    pub(crate) async fn watch(&self, lobby_id: u64) -> (ConnectionHandle, mpsc::Receiver<Bytes>) {
        let affiliation = Affiliation {
            player_session_id: format!("admin-{lobby_id}"),
            lobby_id,
            team_id: None,
            role: Role::AdminWatcher,
        };
        let (tx, rx) = mpsc::channel(64);
        let handle = self.coordinator.registry().register(&affiliation, tx).await;
        (handle, rx)
    }
}

/// Everything queued on a connection so far, decoded.
pub(crate) fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(data) = rx.try_recv() {
        out.push(decode_server_message(&data).unwrap());
    }
    out
}

pub(crate) fn wire_names(msgs: &[ServerMessage]) -> Vec<&'static str> {
    msgs.iter().map(|m| m.wire_name()).collect()
}
