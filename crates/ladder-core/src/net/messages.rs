use serde::{Deserialize, Serialize};

use crate::lobby::{LobbyId, LobbyPhase, TeamId};
use crate::player::{Direction, Role};
use crate::scoring::RoundResult;

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Server
    JoinLobby = 0x01,
    WatchLobby = 0x02,
    SubmitGuess = 0x03,
    RequestState = 0x04,
    SetDirection = 0x05,

    // Server -> Client (progress)
    ConnectionConfirmed = 0x10,
    ConnectionRejected = 0x11,
    StateSnapshot = 0x12,
    StateUpdate = 0x13,
    AlreadySolved = 0x14,
    GuessRejected = 0x15,
    TeamCompleted = 0x16,
    TeamPlaced = 0x17,
    GameStarted = 0x18,
    GameWon = 0x19,
    GameEnded = 0x1A,
    GameReset = 0x1B,
    TimerExpired = 0x1C,

    // Server -> Client (roster and lobby)
    PlayerKicked = 0x20,
    TeamChanged = 0x21,
    TeamsAssigned = 0x22,
    PlayerConnected = 0x23,
    PlayerDisconnected = 0x24,
    LobbyDeleted = 0x25,
    ServerError = 0x26,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::JoinLobby),
            0x02 => Some(Self::WatchLobby),
            0x03 => Some(Self::SubmitGuess),
            0x04 => Some(Self::RequestState),
            0x05 => Some(Self::SetDirection),
            0x10 => Some(Self::ConnectionConfirmed),
            0x11 => Some(Self::ConnectionRejected),
            0x12 => Some(Self::StateSnapshot),
            0x13 => Some(Self::StateUpdate),
            0x14 => Some(Self::AlreadySolved),
            0x15 => Some(Self::GuessRejected),
            0x16 => Some(Self::TeamCompleted),
            0x17 => Some(Self::TeamPlaced),
            0x18 => Some(Self::GameStarted),
            0x19 => Some(Self::GameWon),
            0x1A => Some(Self::GameEnded),
            0x1B => Some(Self::GameReset),
            0x1C => Some(Self::TimerExpired),
            0x20 => Some(Self::PlayerKicked),
            0x21 => Some(Self::TeamChanged),
            0x22 => Some(Self::TeamsAssigned),
            0x23 => Some(Self::PlayerConnected),
            0x24 => Some(Self::PlayerDisconnected),
            0x25 => Some(Self::LobbyDeleted),
            0x26 => Some(Self::ServerError),
            _ => None,
        }
    }

    /// Stable snake_case name used in logs and client event handlers.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::JoinLobby => "join_lobby",
            Self::WatchLobby => "watch_lobby",
            Self::SubmitGuess => "submit_guess",
            Self::RequestState => "request_state",
            Self::SetDirection => "set_direction",
            Self::ConnectionConfirmed => "connection_confirmed",
            Self::ConnectionRejected => "connection_rejected",
            Self::StateSnapshot => "state_snapshot",
            Self::StateUpdate => "state_update",
            Self::AlreadySolved => "already_solved",
            Self::GuessRejected => "guess_rejected",
            Self::TeamCompleted => "team_completed",
            Self::TeamPlaced => "team_placed",
            Self::GameStarted => "game_started",
            Self::GameWon => "game_won",
            Self::GameEnded => "game_ended",
            Self::GameReset => "game_reset",
            Self::TimerExpired => "timer_expired",
            Self::PlayerKicked => "player_kicked",
            Self::TeamChanged => "team_changed",
            Self::TeamsAssigned => "teams_assigned",
            Self::PlayerConnected => "player_connected",
            Self::PlayerDisconnected => "player_disconnected",
            Self::LobbyDeleted => "lobby_deleted",
            Self::ServerError => "server_error",
        }
    }

    pub fn is_client_message(self) -> bool {
        (self as u8) < 0x10
    }
}

/// First frame of a player connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinLobbyMsg {
    pub player_session_id: String,
    #[serde(default)]
    pub protocol_version: u8,
}

/// First frame of an admin observer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchLobbyMsg {
    pub admin_token: String,
    pub lobby_id: LobbyId,
    #[serde(default)]
    pub protocol_version: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitGuessMsg {
    /// Signed so that a negative index reaches the resolver and is answered
    /// with `invalid_step` instead of failing to decode.
    pub word_index: i64,
    pub guess: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStateMsg {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDirectionMsg {
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    JoinLobby(JoinLobbyMsg),
    WatchLobby(WatchLobbyMsg),
    SubmitGuess(SubmitGuessMsg),
    RequestState(RequestStateMsg),
    SetDirection(SetDirectionMsg),
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::JoinLobby(_) => MessageType::JoinLobby,
            Self::WatchLobby(_) => MessageType::WatchLobby,
            Self::SubmitGuess(_) => MessageType::SubmitGuess,
            Self::RequestState(_) => MessageType::RequestState,
            Self::SetDirection(_) => MessageType::SetDirection,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfirmedMsg {
    pub connection_id: u64,
    pub player_session_id: String,
    pub lobby_id: LobbyId,
    pub team_id: Option<TeamId>,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRejectedMsg {
    pub error: String,
}

/// One ladder position as shown to a viewer. `word` is `None` while hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepView {
    pub index: usize,
    pub word: Option<String>,
    pub clue: Option<String>,
    pub transform: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub player_session_id: String,
    pub name: String,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamView {
    pub team_id: TeamId,
    pub team_name: String,
    pub puzzle_title: String,
    pub steps: Vec<StepView>,
    pub revealed_steps: Vec<usize>,
    pub is_completed: bool,
    pub last_updated_at: u64,
    pub active_step: usize,
    pub placement: Option<u32>,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

/// Full current state for one connection. Players get their own `team`;
/// admin watchers get every team in `teams` with all words visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshotMsg {
    pub lobby_id: LobbyId,
    pub phase: LobbyPhase,
    pub winning_team_id: Option<TeamId>,
    pub winning_team_name: Option<String>,
    pub team: Option<TeamView>,
    pub teams: Vec<TeamView>,
    /// Epoch milliseconds at which the round timer fires, if one is running.
    #[serde(default)]
    pub timer_ends_at: Option<u64>,
    /// Final standings once the game is over.
    #[serde(default)]
    pub results: Vec<RoundResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdateMsg {
    pub team_id: TeamId,
    pub revealed_steps: Vec<usize>,
    pub is_completed: bool,
    pub last_updated_at: u64,
    /// The step this update revealed and the word now shown there.
    pub word_index: usize,
    pub word: String,
    pub solved_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlreadySolvedMsg {
    pub word_index: i64,
}

/// Why a submitted guess was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidStep,
    Incorrect,
    GameNotActive,
    UnknownAffiliation,
    /// Progress could not be read or saved; the guess had no effect.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessRejectedMsg {
    pub word_index: i64,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamCompletedMsg {
    pub team_id: TeamId,
    pub team_name: String,
    pub completed_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamPlacedMsg {
    pub team_id: TeamId,
    pub team_name: String,
    pub placement: u32,
    pub first_place_team_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStartedMsg {
    pub lobby_id: LobbyId,
    pub puzzle_title: String,
    pub puzzle_length: usize,
    #[serde(default)]
    pub timer_ends_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameWonMsg {
    pub winning_team_id: TeamId,
    pub winning_team_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEndedMsg {
    pub lobby_id: LobbyId,
    /// True when the game ended before every team finished.
    pub forced: bool,
    #[serde(default)]
    pub results: Vec<RoundResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerExpiredMsg {
    pub lobby_id: LobbyId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResetMsg {
    pub lobby_id: LobbyId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerKickedMsg {
    pub player_session_id: String,
    pub team_id: Option<TeamId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamChangedMsg {
    pub player_session_id: String,
    pub old_team_id: Option<TeamId>,
    pub new_team_id: Option<TeamId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamAssignment {
    pub team_id: TeamId,
    pub team_name: String,
    pub player_session_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamsAssignedMsg {
    pub lobby_id: LobbyId,
    pub assignments: Vec<TeamAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConnectedMsg {
    pub player_session_id: String,
    pub team_id: Option<TeamId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDisconnectedMsg {
    pub player_session_id: String,
    pub team_id: Option<TeamId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyDeletedMsg {
    pub lobby_id: LobbyId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorMsg {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    ConnectionConfirmed(ConnectionConfirmedMsg),
    ConnectionRejected(ConnectionRejectedMsg),
    StateSnapshot(Box<StateSnapshotMsg>),
    StateUpdate(StateUpdateMsg),
    AlreadySolved(AlreadySolvedMsg),
    GuessRejected(GuessRejectedMsg),
    TeamCompleted(TeamCompletedMsg),
    TeamPlaced(TeamPlacedMsg),
    GameStarted(GameStartedMsg),
    GameWon(GameWonMsg),
    GameEnded(GameEndedMsg),
    GameReset(GameResetMsg),
    TimerExpired(TimerExpiredMsg),
    PlayerKicked(PlayerKickedMsg),
    TeamChanged(TeamChangedMsg),
    TeamsAssigned(TeamsAssignedMsg),
    PlayerConnected(PlayerConnectedMsg),
    PlayerDisconnected(PlayerDisconnectedMsg),
    LobbyDeleted(LobbyDeletedMsg),
    ServerError(ServerErrorMsg),
}

impl ServerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::ConnectionConfirmed(_) => MessageType::ConnectionConfirmed,
            Self::ConnectionRejected(_) => MessageType::ConnectionRejected,
            Self::StateSnapshot(_) => MessageType::StateSnapshot,
            Self::StateUpdate(_) => MessageType::StateUpdate,
            Self::AlreadySolved(_) => MessageType::AlreadySolved,
            Self::GuessRejected(_) => MessageType::GuessRejected,
            Self::TeamCompleted(_) => MessageType::TeamCompleted,
            Self::TeamPlaced(_) => MessageType::TeamPlaced,
            Self::GameStarted(_) => MessageType::GameStarted,
            Self::GameWon(_) => MessageType::GameWon,
            Self::GameEnded(_) => MessageType::GameEnded,
            Self::GameReset(_) => MessageType::GameReset,
            Self::TimerExpired(_) => MessageType::TimerExpired,
            Self::PlayerKicked(_) => MessageType::PlayerKicked,
            Self::TeamChanged(_) => MessageType::TeamChanged,
            Self::TeamsAssigned(_) => MessageType::TeamsAssigned,
            Self::PlayerConnected(_) => MessageType::PlayerConnected,
            Self::PlayerDisconnected(_) => MessageType::PlayerDisconnected,
            Self::LobbyDeleted(_) => MessageType::LobbyDeleted,
            Self::ServerError(_) => MessageType::ServerError,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        self.message_type().wire_name()
    }
}
