//! Live connection registry.
//!
//! Connections are grouped into per-lobby slots, each behind its own
//! reader-writer lock, so broadcast lookups in one lobby never wait on
//! registrations in another. The outer map is only written when a lobby gets
//! its first connection or is torn down.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use ladder_core::lobby::{LobbyId, TeamId};
use ladder_core::player::{Affiliation, Direction, Role};

use crate::broadcast::Audience;

/// Process-local connection identifier.
pub type ConnectionId = u64;

/// Outbound queue of encoded frames for one connection.
/// Bounded so a slow client is dropped instead of growing memory.
pub type ConnectionSender = mpsc::Sender<Bytes>;

/// What the transport layer holds for its own connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub connection_id: ConnectionId,
    pub player_session_id: String,
    pub lobby_id: LobbyId,
    pub role: Role,
    /// Cancelled when the registry retires this connection.
    pub cancel: CancellationToken,
}

/// Current affiliation of a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub player_session_id: String,
    pub lobby_id: LobbyId,
    pub team_id: Option<TeamId>,
    pub role: Role,
    pub direction: Direction,
}

/// A connection that was still live when it unregistered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub player_session_id: String,
    pub lobby_id: LobbyId,
    pub team_id: Option<TeamId>,
    pub role: Role,
}

/// One delivery target resolved from an audience.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub lobby_id: LobbyId,
    pub connection_id: ConnectionId,
    pub sender: ConnectionSender,
}

struct Connection {
    player_session_id: String,
    team_id: Option<TeamId>,
    role: Role,
    direction: Direction,
    sender: ConnectionSender,
    cancel: CancellationToken,
}

impl Connection {
    fn retire(self) {
        self.cancel.cancel();
        // Dropping `sender` lets the writer drain its queue and close.
    }
}

#[derive(Default)]
struct LobbyConnections {
    connections: HashMap<ConnectionId, Connection>,
    /// Authoritative connection per player identity.
    players: HashMap<String, ConnectionId>,
}

type LobbySlot = Arc<RwLock<LobbyConnections>>;

pub struct SessionRegistry {
    lobbies: RwLock<HashMap<LobbyId, LobbySlot>>,
    next_connection_id: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            lobbies: RwLock::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    async fn slot(&self, lobby_id: LobbyId) -> Option<LobbySlot> {
        self.lobbies.read().await.get(&lobby_id).map(Arc::clone)
    }

    async fn slot_or_create(&self, lobby_id: LobbyId) -> LobbySlot {
        if let Some(slot) = self.slot(lobby_id).await {
            return slot;
        }
        let mut lobbies = self.lobbies.write().await;
        Arc::clone(lobbies.entry(lobby_id).or_default())
    }

    /// Admit a connection. If the same player identity already has a live
    /// connection, that older one is retired silently.
    pub async fn register(
        &self,
        affiliation: &Affiliation,
        sender: ConnectionSender,
    ) -> ConnectionHandle {
        self.register_with_greeting(affiliation, sender, |_| None)
            .await
    }

    /// Like [`register`](Self::register), but `greeting` is queued on the new
    /// sender before the connection becomes visible to any audience, so it is
    /// always the first frame the connection receives.
    pub async fn register_with_greeting<F>(
        &self,
        affiliation: &Affiliation,
        sender: ConnectionSender,
        greeting: F,
    ) -> ConnectionHandle
    where
        F: FnOnce(ConnectionId) -> Option<Bytes>,
    {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let slot = self.slot_or_create(affiliation.lobby_id).await;
        let mut lobby = slot.write().await;

        if let Some(frame) = greeting(connection_id)
            && sender.try_send(frame).is_err()
        {
            tracing::warn!(connection_id, "Could not queue greeting frame");
        }

        if let Some(old_id) = lobby
            .players
            .insert(affiliation.player_session_id.clone(), connection_id)
            && let Some(old) = lobby.connections.remove(&old_id)
        {
            tracing::info!(
                lobby_id = affiliation.lobby_id,
                player_session_id = %affiliation.player_session_id,
                old_connection_id = old_id,
                connection_id,
                "Retiring superseded connection"
            );
            old.retire();
        }

        lobby.connections.insert(
            connection_id,
            Connection {
                player_session_id: affiliation.player_session_id.clone(),
                team_id: affiliation.team_id,
                role: affiliation.role,
                direction: Direction::default(),
                sender,
                cancel: cancel.clone(),
            },
        );

        tracing::debug!(
            lobby_id = affiliation.lobby_id,
            team_id = ?affiliation.team_id,
            player_session_id = %affiliation.player_session_id,
            connection_id,
            role = ?affiliation.role,
            "Connection registered"
        );

        ConnectionHandle {
            connection_id,
            player_session_id: affiliation.player_session_id.clone(),
            lobby_id: affiliation.lobby_id,
            role: affiliation.role,
            cancel,
        }
    }

    /// Remove a connection. Returns its last affiliation if it was still live,
    /// `None` if it had already been retired.
    pub async fn unregister(&self, handle: &ConnectionHandle) -> Option<Departure> {
        let slot = self.slot(handle.lobby_id).await?;
        let mut lobby = slot.write().await;
        let conn = lobby.connections.remove(&handle.connection_id)?;
        if lobby.players.get(&conn.player_session_id) == Some(&handle.connection_id) {
            lobby.players.remove(&conn.player_session_id);
        }
        let departure = Departure {
            player_session_id: conn.player_session_id.clone(),
            lobby_id: handle.lobby_id,
            team_id: conn.team_id,
            role: conn.role,
        };
        conn.retire();
        Some(departure)
    }

    /// Change the team a live connection belongs to. Returns false when the
    /// handle is no longer live.
    pub async fn update_affiliation(
        &self,
        handle: &ConnectionHandle,
        team_id: Option<TeamId>,
    ) -> bool {
        let Some(slot) = self.slot(handle.lobby_id).await else {
            return false;
        };
        let mut lobby = slot.write().await;
        match lobby.connections.get_mut(&handle.connection_id) {
            Some(conn) => {
                conn.team_id = team_id;
                true
            },
            None => false,
        }
    }

    pub async fn set_direction(&self, handle: &ConnectionHandle, direction: Direction) -> bool {
        let Some(slot) = self.slot(handle.lobby_id).await else {
            return false;
        };
        let mut lobby = slot.write().await;
        match lobby.connections.get_mut(&handle.connection_id) {
            Some(conn) => {
                conn.direction = direction;
                true
            },
            None => false,
        }
    }

    /// Current affiliation of a live connection.
    pub async fn lookup(&self, handle: &ConnectionHandle) -> Option<ConnectionInfo> {
        let slot = self.slot(handle.lobby_id).await?;
        let lobby = slot.read().await;
        lobby
            .connections
            .get(&handle.connection_id)
            .map(|conn| ConnectionInfo {
                player_session_id: conn.player_session_id.clone(),
                lobby_id: handle.lobby_id,
                team_id: conn.team_id,
                role: conn.role,
                direction: conn.direction,
            })
    }

    /// The authoritative handle for a player, if they are connected.
    pub async fn handle_for_player(
        &self,
        lobby_id: LobbyId,
        player_session_id: &str,
    ) -> Option<ConnectionHandle> {
        let slot = self.slot(lobby_id).await?;
        let lobby = slot.read().await;
        let connection_id = *lobby.players.get(player_session_id)?;
        let conn = lobby.connections.get(&connection_id)?;
        Some(ConnectionHandle {
            connection_id,
            player_session_id: conn.player_session_id.clone(),
            lobby_id,
            role: conn.role,
            cancel: conn.cancel.clone(),
        })
    }

    /// Forcibly retire a live connection (kick). Returns false if it was
    /// already gone.
    pub async fn retire(&self, handle: &ConnectionHandle) -> bool {
        self.unregister(handle).await.is_some()
    }

    /// Retire connections whose transport failed, returning the ones that
    /// were still live.
    pub async fn remove_connections(
        &self,
        lobby_id: LobbyId,
        ids: &[ConnectionId],
    ) -> Vec<Departure> {
        let Some(slot) = self.slot(lobby_id).await else {
            return Vec::new();
        };
        let mut lobby = slot.write().await;
        let mut departed = Vec::new();
        for id in ids {
            if let Some(conn) = lobby.connections.remove(id) {
                if lobby.players.get(&conn.player_session_id) == Some(id) {
                    lobby.players.remove(&conn.player_session_id);
                }
                departed.push(Departure {
                    player_session_id: conn.player_session_id.clone(),
                    lobby_id,
                    team_id: conn.team_id,
                    role: conn.role,
                });
                conn.retire();
            }
        }
        departed
    }

    /// Tear down a lobby slot, retiring every connection in it.
    pub async fn drop_lobby(&self, lobby_id: LobbyId) -> usize {
        let Some(slot) = self.lobbies.write().await.remove(&lobby_id) else {
            return 0;
        };
        let mut lobby = slot.write().await;
        lobby.players.clear();
        let count = lobby.connections.len();
        for (_, conn) in lobby.connections.drain() {
            conn.retire();
        }
        count
    }

    /// Snapshot of the live connections matching `audience`.
    pub async fn recipients(&self, audience: &Audience) -> Vec<Recipient> {
        let lobby_id = audience.lobby_id();
        let Some(slot) = self.slot(lobby_id).await else {
            return Vec::new();
        };
        let lobby = slot.read().await;
        let to_recipient = |(&connection_id, conn): (&ConnectionId, &Connection)| Recipient {
            lobby_id,
            connection_id,
            sender: conn.sender.clone(),
        };

        match audience {
            Audience::Player {
                player_session_id, ..
            } => lobby
                .players
                .get(player_session_id)
                .and_then(|id| lobby.connections.get_key_value(id))
                .map(to_recipient)
                .into_iter()
                .collect(),
            Audience::Team { team_id, .. } => lobby
                .connections
                .iter()
                .filter(|(_, c)| c.role == Role::Player && c.team_id == Some(*team_id))
                .map(to_recipient)
                .collect(),
            Audience::Lobby(_) => lobby.connections.iter().map(to_recipient).collect(),
            Audience::AdminWatchers(_) => lobby
                .connections
                .iter()
                .filter(|(_, c)| c.role == Role::AdminWatcher)
                .map(to_recipient)
                .collect(),
        }
    }

    /// The sender of exactly one connection.
    pub async fn recipient(&self, handle: &ConnectionHandle) -> Option<Recipient> {
        let slot = self.slot(handle.lobby_id).await?;
        let lobby = slot.read().await;
        lobby
            .connections
            .get(&handle.connection_id)
            .map(|conn| Recipient {
                lobby_id: handle.lobby_id,
                connection_id: handle.connection_id,
                sender: conn.sender.clone(),
            })
    }

    /// (lobbies with at least one connection, live connections).
    pub async fn stats(&self) -> (usize, usize) {
        let slots: Vec<LobbySlot> = self.lobbies.read().await.values().map(Arc::clone).collect();
        let mut lobbies = 0;
        let mut connections = 0;
        for slot in slots {
            let n = slot.read().await.connections.len();
            if n > 0 {
                lobbies += 1;
                connections += n;
            }
        }
        (lobbies, connections)
    }
}
