use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;

use ladder_core::lobby::{LobbyId, TeamId};
use ladder_core::net::messages::{PlayerDisconnectedMsg, ServerMessage};
use ladder_core::net::protocol::encode_server_message;
use ladder_core::player::Role;

use crate::registry::{ConnectionHandle, ConnectionId, Departure, Recipient, SessionRegistry};

/// Who an event is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// The authoritative connection of one player.
    Player {
        lobby_id: LobbyId,
        player_session_id: String,
    },
    /// Every player connection affiliated with the team.
    Team { lobby_id: LobbyId, team_id: TeamId },
    /// Every connection in the lobby, admin watchers included.
    Lobby(LobbyId),
    AdminWatchers(LobbyId),
}

impl Audience {
    pub fn lobby_id(&self) -> LobbyId {
        match self {
            Self::Player { lobby_id, .. } | Self::Team { lobby_id, .. } => *lobby_id,
            Self::Lobby(lobby_id) | Self::AdminWatchers(lobby_id) => *lobby_id,
        }
    }

    pub fn team(lobby_id: LobbyId, team_id: TeamId) -> Self {
        Self::Team { lobby_id, team_id }
    }

    /// Who hears about a player's presence: their team, if any, and the
    /// lobby's admin watchers.
    pub fn presence(lobby_id: LobbyId, team_id: Option<TeamId>) -> Vec<Self> {
        let mut audiences = Vec::with_capacity(2);
        if let Some(team_id) = team_id {
            audiences.push(Self::team(lobby_id, team_id));
        }
        audiences.push(Self::AdminWatchers(lobby_id));
        audiences
    }
}

/// Fans encoded events out to live connections.
///
/// Each event is encoded once. A recipient whose queue is full or closed is
/// skipped and retired after the loop; it never stops delivery to the rest.
/// An evicted player is announced with `player_disconnected` to the same
/// audience a clean disconnect would reach.
#[derive(Clone)]
pub struct BroadcastRouter {
    registry: Arc<SessionRegistry>,
}

impl BroadcastRouter {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver to one audience. Returns how many connections accepted it.
    pub async fn send(&self, audience: &Audience, msg: &ServerMessage) -> usize {
        self.send_many(std::slice::from_ref(audience), msg).await
    }

    /// Deliver to the union of `audiences`, at most once per connection.
    pub async fn send_many(&self, audiences: &[Audience], msg: &ServerMessage) -> usize {
        let Some(bytes) = encode(msg) else {
            return 0;
        };
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();
        for audience in audiences {
            for r in self.registry.recipients(audience).await {
                if seen.insert((r.lobby_id, r.connection_id)) {
                    recipients.push(r);
                }
            }
        }
        let (delivered, departed) = self.deliver(recipients, &bytes, msg.wire_name()).await;
        self.announce_departures(departed).await;
        delivered
    }

    /// Deliver to exactly one connection. Returns false if it is gone or failed.
    pub async fn send_to_connection(&self, handle: &ConnectionHandle, msg: &ServerMessage) -> bool {
        let Some(recipient) = self.registry.recipient(handle).await else {
            tracing::debug!(
                connection_id = handle.connection_id,
                event = msg.wire_name(),
                "Dropping event for departed connection"
            );
            return false;
        };
        let Some(bytes) = encode(msg) else {
            return false;
        };
        let (delivered, departed) = self.deliver(vec![recipient], &bytes, msg.wire_name()).await;
        self.announce_departures(departed).await;
        delivered == 1
    }

    /// Announce evicted players. Announcing can evict further connections, so
    /// this works through a queue rather than recursing.
    async fn announce_departures(&self, mut pending: Vec<Departure>) {
        while let Some(departure) = pending.pop() {
            if departure.role != Role::Player {
                continue;
            }
            tracing::info!(
                lobby_id = departure.lobby_id,
                team_id = ?departure.team_id,
                player_session_id = %departure.player_session_id,
                "Evicted player announced as disconnected"
            );
            let msg = ServerMessage::PlayerDisconnected(PlayerDisconnectedMsg {
                player_session_id: departure.player_session_id,
                team_id: departure.team_id,
            });
            let Some(bytes) = encode(&msg) else {
                continue;
            };
            let mut seen = HashSet::new();
            let mut recipients = Vec::new();
            for audience in Audience::presence(departure.lobby_id, departure.team_id) {
                for r in self.registry.recipients(&audience).await {
                    if seen.insert(r.connection_id) {
                        recipients.push(r);
                    }
                }
            }
            let (_, more) = self.deliver(recipients, &bytes, msg.wire_name()).await;
            pending.extend(more);
        }
    }

    async fn deliver(
        &self,
        recipients: Vec<Recipient>,
        bytes: &Bytes,
        event: &str,
    ) -> (usize, Vec<Departure>) {
        let mut delivered = 0;
        let mut failed: BTreeMap<LobbyId, Vec<ConnectionId>> = BTreeMap::new();

        for r in recipients {
            match r.sender.try_send(bytes.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        lobby_id = r.lobby_id,
                        connection_id = r.connection_id,
                        event,
                        "Outbound queue full, dropping slow connection"
                    );
                    failed.entry(r.lobby_id).or_default().push(r.connection_id);
                },
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        lobby_id = r.lobby_id,
                        connection_id = r.connection_id,
                        event,
                        "Connection closed during delivery"
                    );
                    failed.entry(r.lobby_id).or_default().push(r.connection_id);
                },
            }
        }

        let mut departed = Vec::new();
        for (lobby_id, ids) in failed {
            departed.extend(self.registry.remove_connections(lobby_id, &ids).await);
        }
        (delivered, departed)
    }
}

fn encode(msg: &ServerMessage) -> Option<Bytes> {
    match encode_server_message(msg) {
        Ok(data) => Some(Bytes::from(data)),
        Err(e) => {
            tracing::warn!(event = msg.wire_name(), error = %e, "Failed to encode event");
            None
        },
    }
}
