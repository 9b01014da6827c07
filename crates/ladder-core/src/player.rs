use serde::{Deserialize, Serialize};

use crate::lobby::{LobbyId, TeamId};

/// Role of a live connection within a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A puzzle-solving participant.
    Player,
    /// An administrator observing the lobby without playing.
    AdminWatcher,
}

/// Which end of the ladder a viewer is working from.
///
/// Purely a presentation preference: it never changes team progress, only
/// which step is shown to that viewer as active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the top end (index 0) toward the bottom.
    #[default]
    Down,
    /// From the bottom end (index `len - 1`) upward.
    Up,
}

impl Direction {
    pub fn from_start(self) -> bool {
        matches!(self, Direction::Down)
    }
}

/// Everything the server knows about who is behind a connection, as resolved
/// by authentication before the session registry admits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliation {
    pub player_session_id: String,
    pub lobby_id: LobbyId,
    pub team_id: Option<TeamId>,
    pub role: Role,
}
