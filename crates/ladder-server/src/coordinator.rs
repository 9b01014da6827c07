//! Lobby and team coordination.
//!
//! The coordinator is the only caller of the guess resolver. Each team's
//! progress is guarded by that team's own async mutex, held across the
//! load, resolve, save and broadcast of a guess, so accepted guesses for one
//! team are totally ordered and their `state_update`s leave in that order.
//! Different teams never share a lock.
//!
//! Lock order is the games map, then team lock(s) in ascending id, then
//! standings. Nothing holding a team lock touches the games map.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

use ladder_core::lobby::{LobbyId, LobbyPhase, TeamId};
use ladder_core::net::messages::{
    AlreadySolvedMsg, GameEndedMsg, GameResetMsg, GameStartedMsg, GameWonMsg, GuessRejectedMsg,
    LobbyDeletedMsg, PlayerConnectedMsg, PlayerDisconnectedMsg, PlayerKickedMsg, RejectReason,
    ServerMessage, StateUpdateMsg, TeamAssignment, TeamChangedMsg, TeamCompletedMsg,
    TeamPlacedMsg, TeamsAssignedMsg, TimerExpiredMsg,
};
use ladder_core::player::Role;
use ladder_core::progress::TeamProgress;
use ladder_core::puzzle::Puzzle;
use ladder_core::resolver::{GuessError, resolve_guess};
use ladder_core::scoring::{RoundResult, Unfinished, rank_round};
use ladder_core::time::timestamp_now_ms;

use crate::broadcast::{Audience, BroadcastRouter};
use crate::registry::{ConnectionHandle, Departure, SessionRegistry};
use crate::store::{LobbyStore, StoreError};

/// Colour names handed out to generated teams.
const TEAM_NAMES: [&str; 10] = [
    "Red", "Blue", "Green", "Gold", "Violet", "Orange", "Teal", "Silver", "Coral", "Indigo",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    UnknownLobby(LobbyId),
    UnknownTeam(TeamId),
    UnknownPlayer(String),
    InvalidTransition { from: LobbyPhase, to: LobbyPhase },
    NotForming(LobbyId),
    NoTeams(LobbyId),
    TeamsExist(LobbyId),
    InvalidTeamCount { requested: usize, max: usize },
    InvalidDuration,
    Store(StoreError),
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLobby(id) => write!(f, "unknown lobby {id}"),
            Self::UnknownTeam(id) => write!(f, "unknown team {id}"),
            Self::UnknownPlayer(id) => write!(f, "unknown player {id}"),
            Self::InvalidTransition { from, to } => {
                write!(f, "cannot move lobby from {from} to {to}")
            },
            Self::NotForming(id) => write!(f, "lobby {id} is not forming"),
            Self::NoTeams(id) => write!(f, "lobby {id} has no teams"),
            Self::TeamsExist(id) => write!(f, "lobby {id} already has teams"),
            Self::InvalidTeamCount { requested, max } => {
                write!(f, "team count must be between 2 and {max}, got {requested}")
            },
            Self::InvalidDuration => write!(f, "round timer must be longer than zero"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// What happened to a submitted guess, as far as the submitter is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessReport {
    Accepted {
        team_id: TeamId,
        word_index: usize,
        team_completed: bool,
        /// Set when this guess completed the team's ladder.
        placement: Option<u32>,
    },
    AlreadySolved,
    Rejected(RejectReason),
}

pub(crate) struct TeamSlot {
    pub(crate) name: String,
    pub(crate) lock: Mutex<()>,
}

pub(crate) struct Standings {
    pub(crate) phase: LobbyPhase,
    /// Team ids in completion order.
    pub(crate) placements: Vec<TeamId>,
    /// Filled in when the round ends.
    pub(crate) results: Vec<RoundResult>,
}

/// A started game: the puzzle and team roster are fixed until reset.
pub(crate) struct LobbyGame {
    pub(crate) puzzle: Puzzle,
    pub(crate) teams: BTreeMap<TeamId, TeamSlot>,
    pub(crate) standings: Mutex<Standings>,
    /// Cancelled when the round ends or the game is retired.
    pub(crate) timer: CancellationToken,
    pub(crate) timer_ends_at: Option<u64>,
}

impl LobbyGame {
    pub(crate) fn team_name(&self, team_id: TeamId) -> String {
        self.teams
            .get(&team_id)
            .map(|t| t.name.clone())
            .unwrap_or_default()
    }

    pub(crate) async fn lock_all_teams(&self) -> Vec<MutexGuard<'_, ()>> {
        let mut guards = Vec::with_capacity(self.teams.len());
        for slot in self.teams.values() {
            guards.push(slot.lock.lock().await);
        }
        guards
    }
}

pub struct Coordinator {
    pub(crate) store: Arc<dyn LobbyStore>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) router: BroadcastRouter,
    /// Lobbies without an entry are forming.
    pub(crate) games: RwLock<HashMap<LobbyId, Arc<LobbyGame>>>,
    max_teams_per_lobby: usize,
}

fn lobby_error(lobby_id: LobbyId, e: StoreError) -> CoordinatorError {
    match e {
        StoreError::NotFound(_) => CoordinatorError::UnknownLobby(lobby_id),
        other => CoordinatorError::Store(other),
    }
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn LobbyStore>,
        registry: Arc<SessionRegistry>,
        max_teams_per_lobby: usize,
    ) -> Self {
        let router = BroadcastRouter::new(Arc::clone(&registry));
        Self {
            store,
            registry,
            router,
            games: RwLock::new(HashMap::new()),
            max_teams_per_lobby,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &BroadcastRouter {
        &self.router
    }

    pub(crate) async fn game(&self, lobby_id: LobbyId) -> Option<Arc<LobbyGame>> {
        self.games.read().await.get(&lobby_id).map(Arc::clone)
    }

    pub async fn phase(&self, lobby_id: LobbyId) -> LobbyPhase {
        let Some(game) = self.game(lobby_id).await else {
            return LobbyPhase::Forming;
        };
        game.standings.lock().await.phase
    }

    /// Lobbies currently in progress.
    pub async fn active_games(&self) -> usize {
        let games: Vec<Arc<LobbyGame>> = self.games.read().await.values().map(Arc::clone).collect();
        let mut active = 0;
        for game in games {
            if game.standings.lock().await.phase == LobbyPhase::InProgress {
                active += 1;
            }
        }
        active
    }

    pub async fn on_connected(&self, handle: &ConnectionHandle) {
        if handle.role != Role::Player {
            return;
        }
        let Some(info) = self.registry.lookup(handle).await else {
            return;
        };
        let msg = ServerMessage::PlayerConnected(PlayerConnectedMsg {
            player_session_id: info.player_session_id,
            team_id: info.team_id,
        });
        self.router
            .send_many(&Audience::presence(handle.lobby_id, info.team_id), &msg)
            .await;
    }

    pub async fn on_disconnected(&self, departure: &Departure) {
        if departure.role != Role::Player {
            return;
        }
        tracing::info!(
            lobby_id = departure.lobby_id,
            team_id = ?departure.team_id,
            player_session_id = %departure.player_session_id,
            "Player disconnected"
        );
        let msg = ServerMessage::PlayerDisconnected(PlayerDisconnectedMsg {
            player_session_id: departure.player_session_id.clone(),
            team_id: departure.team_id,
        });
        self.router
            .send_many(
                &Audience::presence(departure.lobby_id, departure.team_id),
                &msg,
            )
            .await;
    }

    async fn reject(
        &self,
        handle: &ConnectionHandle,
        word_index: i64,
        reason: RejectReason,
    ) -> GuessReport {
        tracing::debug!(
            lobby_id = handle.lobby_id,
            connection_id = handle.connection_id,
            word_index,
            ?reason,
            "Guess rejected"
        );
        let msg = ServerMessage::GuessRejected(GuessRejectedMsg { word_index, reason });
        self.router.send_to_connection(handle, &msg).await;
        GuessReport::Rejected(reason)
    }

    /// Resolve a guess from `handle`. Informational outcomes are unicast to
    /// the submitter; an accepted guess is broadcast to the team and the
    /// lobby's admin watchers. Only a persistence failure is an error.
    pub async fn submit_guess(
        &self,
        handle: &ConnectionHandle,
        word_index: i64,
        guess: &str,
    ) -> Result<GuessReport, CoordinatorError> {
        let Some(info) = self.registry.lookup(handle).await else {
            tracing::debug!(
                connection_id = handle.connection_id,
                "Guess from departed connection ignored"
            );
            return Ok(GuessReport::Rejected(RejectReason::UnknownAffiliation));
        };
        let lobby_id = info.lobby_id;
        let (Role::Player, Some(team_id)) = (info.role, info.team_id) else {
            return Ok(self
                .reject(handle, word_index, RejectReason::UnknownAffiliation)
                .await);
        };
        let Some(game) = self.game(lobby_id).await else {
            return Ok(self
                .reject(handle, word_index, RejectReason::GameNotActive)
                .await);
        };
        let Some(slot) = game.teams.get(&team_id) else {
            return Ok(self
                .reject(handle, word_index, RejectReason::UnknownAffiliation)
                .await);
        };

        let _team_guard = slot.lock.lock().await;

        if game.standings.lock().await.phase != LobbyPhase::InProgress {
            return Ok(self
                .reject(handle, word_index, RejectReason::GameNotActive)
                .await);
        }

        let now = timestamp_now_ms();
        let progress = match self.store.load_team_progress(team_id) {
            Ok(Some(progress)) => progress,
            Ok(None) => TeamProgress::seeded(&game.puzzle, now),
            Err(e) => {
                tracing::error!(lobby_id, team_id, error = %e, "Failed to load team progress");
                self.reject(handle, word_index, RejectReason::Unavailable)
                    .await;
                return Err(e.into());
            },
        };

        let outcome = match resolve_guess(&game.puzzle, &progress, word_index, guess, now) {
            Ok(outcome) => outcome,
            Err(GuessError::AlreadySolved) => {
                tracing::debug!(lobby_id, team_id, word_index, "Step already solved");
                let msg = ServerMessage::AlreadySolved(AlreadySolvedMsg { word_index });
                self.router.send_to_connection(handle, &msg).await;
                return Ok(GuessReport::AlreadySolved);
            },
            Err(GuessError::InvalidStep) => {
                return Ok(self
                    .reject(handle, word_index, RejectReason::InvalidStep)
                    .await);
            },
            Err(GuessError::Incorrect) => {
                return Ok(self
                    .reject(handle, word_index, RejectReason::Incorrect)
                    .await);
            },
        };

        if let Err(e) = self.store.save_team_progress(team_id, &outcome.progress) {
            tracing::error!(lobby_id, team_id, error = %e, "Failed to save team progress");
            self.reject(handle, word_index, RejectReason::Unavailable)
                .await;
            return Err(e.into());
        }

        tracing::info!(
            lobby_id,
            team_id,
            player_session_id = %info.player_session_id,
            word_index = outcome.word_index,
            completed = outcome.progress.is_completed,
            "Guess accepted"
        );

        let word = game
            .puzzle
            .step(outcome.word_index)
            .map(|s| s.word.clone())
            .unwrap_or_default();
        let update = ServerMessage::StateUpdate(StateUpdateMsg {
            team_id,
            revealed_steps: outcome.progress.revealed_vec(),
            is_completed: outcome.progress.is_completed,
            last_updated_at: outcome.progress.last_updated_at,
            word_index: outcome.word_index,
            word,
            solved_by: info.player_session_id.clone(),
        });
        self.router
            .send_many(&Audience::presence(lobby_id, Some(team_id)), &update)
            .await;

        let mut placement = None;
        if outcome.team_completed {
            placement = self.complete_team(lobby_id, &game, team_id, now).await;
        }

        Ok(GuessReport::Accepted {
            team_id,
            word_index: outcome.word_index,
            team_completed: outcome.team_completed,
            placement,
        })
    }

    /// Announce a finished ladder to its team and place it. The caller holds
    /// the team's lock.
    async fn complete_team(
        &self,
        lobby_id: LobbyId,
        game: &LobbyGame,
        team_id: TeamId,
        completed_at: u64,
    ) -> Option<u32> {
        let completed = ServerMessage::TeamCompleted(TeamCompletedMsg {
            team_id,
            team_name: game.team_name(team_id),
            completed_at,
        });
        self.router
            .send_many(&Audience::presence(lobby_id, Some(team_id)), &completed)
            .await;
        self.record_completion(lobby_id, game, team_id).await
    }

    /// Place a newly completed team. The first placement wins the game; the
    /// last one ends it.
    async fn record_completion(
        &self,
        lobby_id: LobbyId,
        game: &LobbyGame,
        team_id: TeamId,
    ) -> Option<u32> {
        let mut standings = game.standings.lock().await;
        if standings.placements.contains(&team_id) {
            return None;
        }
        standings.placements.push(team_id);
        let placement = standings.placements.len() as u32;
        let first_team_id = standings.placements[0];
        let first_place_team_name = game.team_name(first_team_id);
        let team_name = game.team_name(team_id);

        tracing::info!(lobby_id, team_id, placement, "Team completed ladder");

        let lobby = Audience::Lobby(lobby_id);
        self.router
            .send(
                &lobby,
                &ServerMessage::TeamPlaced(TeamPlacedMsg {
                    team_id,
                    team_name: team_name.clone(),
                    placement,
                    first_place_team_name,
                }),
            )
            .await;

        if placement == 1 {
            tracing::info!(lobby_id, team_id, "Game won");
            self.router
                .send(
                    &lobby,
                    &ServerMessage::GameWon(GameWonMsg {
                        winning_team_id: team_id,
                        winning_team_name: team_name,
                    }),
                )
                .await;
        }

        if standings.placements.len() == game.teams.len()
            && standings.phase == LobbyPhase::InProgress
        {
            tracing::info!(lobby_id, "Every team completed, game ended");
            self.finish_round(lobby_id, game, &mut standings, false)
                .await;
        }

        Some(placement)
    }

    /// `InProgress -> Completed`: score the round and announce the results.
    /// Callers hold the lock of every team that might still be guessing.
    async fn finish_round(
        &self,
        lobby_id: LobbyId,
        game: &LobbyGame,
        standings: &mut Standings,
        forced: bool,
    ) {
        standings.phase = LobbyPhase::Completed;
        game.timer.cancel();
        standings.results = self.score_round(lobby_id, game, &standings.placements);
        self.router
            .send(
                &Audience::Lobby(lobby_id),
                &ServerMessage::GameEnded(GameEndedMsg {
                    lobby_id,
                    forced,
                    results: standings.results.clone(),
                }),
            )
            .await;
    }

    fn score_round(
        &self,
        lobby_id: LobbyId,
        game: &LobbyGame,
        placements: &[TeamId],
    ) -> Vec<RoundResult> {
        let ladder_len = game.puzzle.len();
        let finishers: Vec<(TeamId, String)> = placements
            .iter()
            .map(|&team_id| (team_id, game.team_name(team_id)))
            .collect();
        let mut unfinished = Vec::new();
        for (&team_id, slot) in &game.teams {
            if placements.contains(&team_id) {
                continue;
            }
            let progress = match self.store.load_team_progress(team_id) {
                Ok(Some(progress)) => progress,
                Ok(None) => TeamProgress::seeded(&game.puzzle, 0),
                Err(e) => {
                    tracing::warn!(lobby_id, team_id, error = %e, "Scoring team from seeded progress");
                    TeamProgress::seeded(&game.puzzle, 0)
                },
            };
            unfinished.push(Unfinished {
                team_id,
                team_name: slot.name.clone(),
                completion_ratio: progress.completion_ratio(ladder_len),
            });
        }
        rank_round(&finishers, &unfinished)
    }

    /// The round timer ran out while the game was still in progress.
    async fn expire_round(&self, lobby_id: LobbyId, game: &LobbyGame) {
        let _team_guards = game.lock_all_teams().await;
        let mut standings = game.standings.lock().await;
        if standings.phase != LobbyPhase::InProgress {
            return;
        }
        tracing::info!(lobby_id, "Round timer expired");
        self.router
            .send(
                &Audience::Lobby(lobby_id),
                &ServerMessage::TimerExpired(TimerExpiredMsg { lobby_id }),
            )
            .await;
        self.finish_round(lobby_id, game, &mut standings, true)
            .await;
    }

    /// `Forming -> InProgress`: seed and persist every team's progress, and
    /// arm the round timer if one is given. A ladder with nothing between its
    /// ends is complete at once, so every team is placed immediately.
    pub async fn start_game(
        self: &Arc<Self>,
        lobby_id: LobbyId,
        round_timer: Option<Duration>,
    ) -> Result<GameStartedMsg, CoordinatorError> {
        self.store
            .find_lobby(lobby_id)
            .map_err(|e| lobby_error(lobby_id, e))?;
        if round_timer.is_some_and(|d| d.is_zero()) {
            return Err(CoordinatorError::InvalidDuration);
        }

        let mut games = self.games.write().await;
        if let Some(game) = games.get(&lobby_id) {
            let from = game.standings.lock().await.phase;
            return Err(CoordinatorError::InvalidTransition {
                from,
                to: LobbyPhase::InProgress,
            });
        }

        let records = self.store.list_teams(lobby_id)?;
        if records.is_empty() {
            return Err(CoordinatorError::NoTeams(lobby_id));
        }
        let puzzle = self
            .store
            .load_puzzle(lobby_id)
            .map_err(|e| lobby_error(lobby_id, e))?;

        let now = timestamp_now_ms();
        let seeded = TeamProgress::seeded(&puzzle, now);
        let mut teams = BTreeMap::new();
        for record in records {
            self.store.save_team_progress(record.id, &seeded)?;
            teams.insert(
                record.id,
                TeamSlot {
                    name: record.name,
                    lock: Mutex::new(()),
                },
            );
        }

        let timer_ends_at = round_timer.map(|d| now + d.as_millis() as u64);
        let started = GameStartedMsg {
            lobby_id,
            puzzle_title: puzzle.meta.title.clone(),
            puzzle_length: puzzle.len(),
            timer_ends_at,
        };
        tracing::info!(
            lobby_id,
            teams = teams.len(),
            puzzle_length = puzzle.len(),
            timer_secs = round_timer.map(|d| d.as_secs()),
            "Game started"
        );
        let game = Arc::new(LobbyGame {
            puzzle,
            teams,
            standings: Mutex::new(Standings {
                phase: LobbyPhase::InProgress,
                placements: Vec::new(),
                results: Vec::new(),
            }),
            timer: CancellationToken::new(),
            timer_ends_at,
        });
        games.insert(lobby_id, Arc::clone(&game));

        self.router
            .send(
                &Audience::Lobby(lobby_id),
                &ServerMessage::GameStarted(started.clone()),
            )
            .await;

        // Still under the games lock, so no reset can slip in between
        if seeded.is_completed {
            let _team_guards = game.lock_all_teams().await;
            for &team_id in game.teams.keys() {
                self.complete_team(lobby_id, &game, team_id, now).await;
            }
        }

        if let Some(duration) = round_timer {
            let coordinator = Arc::clone(self);
            let game = Arc::clone(&game);
            tokio::spawn(async move {
                tokio::select! {
                    () = game.timer.cancelled() => {},
                    () = tokio::time::sleep(duration) => {
                        coordinator.expire_round(lobby_id, &game).await;
                    },
                }
            });
        }
        drop(games);
        Ok(started)
    }

    /// `InProgress -> Completed` by admin. Waits for in-flight guesses.
    pub async fn end_game(&self, lobby_id: LobbyId) -> Result<(), CoordinatorError> {
        self.store
            .find_lobby(lobby_id)
            .map_err(|e| lobby_error(lobby_id, e))?;
        let Some(game) = self.game(lobby_id).await else {
            return Err(CoordinatorError::InvalidTransition {
                from: LobbyPhase::Forming,
                to: LobbyPhase::Completed,
            });
        };

        let _team_guards = game.lock_all_teams().await;
        let mut standings = game.standings.lock().await;
        if !standings.phase.can_transition_to(LobbyPhase::Completed) {
            return Err(CoordinatorError::InvalidTransition {
                from: standings.phase,
                to: LobbyPhase::Completed,
            });
        }
        tracing::info!(lobby_id, "Game ended by admin");
        self.finish_round(lobby_id, &game, &mut standings, true)
            .await;
        Ok(())
    }

    /// Stop a detached game once nothing is mid-guess, and mark it forming
    /// so late arrivals holding the old game are turned away.
    async fn retire(game: &LobbyGame) {
        game.timer.cancel();
        let _team_guards = game.lock_all_teams().await;
        game.standings.lock().await.phase = LobbyPhase::Forming;
    }

    /// Any phase -> `Forming`: drop the game and persisted progress.
    pub async fn reset_game(&self, lobby_id: LobbyId) -> Result<(), CoordinatorError> {
        self.store
            .find_lobby(lobby_id)
            .map_err(|e| lobby_error(lobby_id, e))?;

        // Held until the reset is announced so a start cannot seed in between.
        let mut games = self.games.write().await;
        let retired = games.remove(&lobby_id);
        if let Some(ref game) = retired {
            Self::retire(game).await;
        }
        for team in self.store.list_teams(lobby_id)? {
            self.store.clear_team_progress(team.id)?;
        }
        tracing::info!(lobby_id, had_game = retired.is_some(), "Game reset");

        self.router
            .send(
                &Audience::Lobby(lobby_id),
                &ServerMessage::GameReset(GameResetMsg { lobby_id }),
            )
            .await;
        drop(games);
        Ok(())
    }

    /// Tear the lobby down: notify, delete from the store, close connections.
    pub async fn delete_lobby(&self, lobby_id: LobbyId) -> Result<(), CoordinatorError> {
        self.store
            .find_lobby(lobby_id)
            .map_err(|e| lobby_error(lobby_id, e))?;

        let mut games = self.games.write().await;
        if let Some(game) = games.remove(&lobby_id) {
            Self::retire(&game).await;
        }
        self.router
            .send(
                &Audience::Lobby(lobby_id),
                &ServerMessage::LobbyDeleted(LobbyDeletedMsg { lobby_id }),
            )
            .await;
        self.store
            .delete_lobby(lobby_id)
            .map_err(|e| lobby_error(lobby_id, e))?;
        drop(games);

        let closed = self.registry.drop_lobby(lobby_id).await;
        tracing::info!(lobby_id, closed, "Lobby deleted");
        Ok(())
    }

    /// Create `team_count` teams and deal the lobby's players into them at random.
    pub async fn assign_teams(
        &self,
        lobby_id: LobbyId,
        team_count: usize,
    ) -> Result<TeamsAssignedMsg, CoordinatorError> {
        self.store
            .find_lobby(lobby_id)
            .map_err(|e| lobby_error(lobby_id, e))?;

        // Held throughout so a concurrent start cannot see half the teams.
        let games = self.games.write().await;
        if games.contains_key(&lobby_id) {
            return Err(CoordinatorError::NotForming(lobby_id));
        }
        if team_count < 2 || team_count > self.max_teams_per_lobby {
            return Err(CoordinatorError::InvalidTeamCount {
                requested: team_count,
                max: self.max_teams_per_lobby,
            });
        }
        if !self.store.list_teams(lobby_id)?.is_empty() {
            return Err(CoordinatorError::TeamsExist(lobby_id));
        }

        let mut players = self.store.list_lobby_players(lobby_id)?;
        players.shuffle(&mut rand::rng());
        let mut names: Vec<&str> = TEAM_NAMES.to_vec();
        names.shuffle(&mut rand::rng());

        let mut assignments = Vec::with_capacity(team_count);
        for i in 0..team_count {
            let name = match names.get(i) {
                Some(colour) => format!("Team {colour}"),
                None => format!("Team {}", i + 1),
            };
            let team = self.store.create_team(lobby_id, &name)?;
            assignments.push(TeamAssignment {
                team_id: team.id,
                team_name: team.name,
                player_session_ids: Vec::new(),
            });
        }

        for (i, player) in players.iter().enumerate() {
            let assignment = &mut assignments[i % team_count];
            self.store
                .set_player_team(&player.session_id, Some(assignment.team_id))?;
            assignment
                .player_session_ids
                .push(player.session_id.clone());
            if let Some(handle) = self
                .registry
                .handle_for_player(lobby_id, &player.session_id)
                .await
            {
                self.registry
                    .update_affiliation(&handle, Some(assignment.team_id))
                    .await;
            }
        }

        let msg = TeamsAssignedMsg {
            lobby_id,
            assignments,
        };
        tracing::info!(
            lobby_id,
            teams = team_count,
            players = players.len(),
            "Teams assigned"
        );
        self.router
            .send(
                &Audience::Lobby(lobby_id),
                &ServerMessage::TeamsAssigned(msg.clone()),
            )
            .await;
        drop(games);
        Ok(msg)
    }

    /// Move a player to `team_id`, or unassign them with `None`.
    pub async fn reassign_player(
        &self,
        player_session_id: &str,
        team_id: Option<TeamId>,
    ) -> Result<TeamChangedMsg, CoordinatorError> {
        let player = self.store.find_player(player_session_id).map_err(|e| match e {
            StoreError::NotFound(_) => CoordinatorError::UnknownPlayer(player_session_id.to_string()),
            other => CoordinatorError::Store(other),
        })?;
        let lobby_id = player.lobby_id;
        if let Some(team_id) = team_id {
            let team = self.store.find_team(team_id).map_err(|e| match e {
                StoreError::NotFound(_) => CoordinatorError::UnknownTeam(team_id),
                other => CoordinatorError::Store(other),
            })?;
            if team.lobby_id != lobby_id {
                return Err(CoordinatorError::UnknownTeam(team_id));
            }
        }

        let changed = TeamChangedMsg {
            player_session_id: player_session_id.to_string(),
            old_team_id: player.team_id,
            new_team_id: team_id,
        };
        if player.team_id == team_id {
            return Ok(changed);
        }

        self.store.set_player_team(player_session_id, team_id)?;
        let handle = self
            .registry
            .handle_for_player(lobby_id, player_session_id)
            .await;
        if let Some(ref handle) = handle {
            self.registry.update_affiliation(handle, team_id).await;
        }

        tracing::info!(
            lobby_id,
            player_session_id,
            old_team_id = ?player.team_id,
            new_team_id = ?team_id,
            "Player reassigned"
        );

        let mut audiences = Vec::with_capacity(3);
        for team in [player.team_id, team_id].into_iter().flatten() {
            audiences.push(Audience::team(lobby_id, team));
        }
        audiences.push(Audience::AdminWatchers(lobby_id));
        self.router
            .send_many(&audiences, &ServerMessage::TeamChanged(changed.clone()))
            .await;

        if let Some(ref handle) = handle
            && let Err(e) = self.resync(handle).await
        {
            tracing::warn!(lobby_id, player_session_id, error = %e, "Resync after move failed");
        }
        Ok(changed)
    }

    /// Remove a player from the lobby and close their connection.
    pub async fn kick_player(
        &self,
        player_session_id: &str,
    ) -> Result<PlayerKickedMsg, CoordinatorError> {
        let player = self.store.find_player(player_session_id).map_err(|e| match e {
            StoreError::NotFound(_) => CoordinatorError::UnknownPlayer(player_session_id.to_string()),
            other => CoordinatorError::Store(other),
        })?;
        let lobby_id = player.lobby_id;
        let kicked = PlayerKickedMsg {
            player_session_id: player_session_id.to_string(),
            team_id: player.team_id,
        };
        let msg = ServerMessage::PlayerKicked(kicked.clone());

        // Addressed to the player first, then their socket is retired; the
        // writer drains the queued notice before closing.
        if let Some(handle) = self
            .registry
            .handle_for_player(lobby_id, player_session_id)
            .await
        {
            self.router.send_to_connection(&handle, &msg).await;
            self.registry.retire(&handle).await;
        }

        self.store.remove_player(player_session_id)?;
        tracing::info!(lobby_id, team_id = ?player.team_id, player_session_id, "Player kicked");

        self.router
            .send_many(&Audience::presence(lobby_id, player.team_id), &msg)
            .await;
        Ok(kicked)
    }
}
