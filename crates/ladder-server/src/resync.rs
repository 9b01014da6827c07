//! Full-state snapshots for joining, reconnecting and lagging viewers.
//!
//! A snapshot is built and queued while holding the locks of every team it
//! shows, so an in-flight guess either lands in the snapshot or arrives as a
//! `state_update` after it, never both out of order.

use tokio::sync::MutexGuard;

use ladder_core::lobby::{LobbyId, LobbyPhase, TeamId};
use ladder_core::net::messages::{
    ServerMessage, StateSnapshotMsg, StepView, TeamMember, TeamView,
};
use ladder_core::player::{Direction, Role};
use ladder_core::progress::TeamProgress;

use crate::coordinator::{Coordinator, CoordinatorError, LobbyGame};
use crate::registry::{ConnectionHandle, ConnectionInfo};
use crate::store::StoreError;

/// Whose eyes a snapshot is rendered for.
#[derive(Debug, Clone, Copy)]
enum Viewer {
    /// A player sees only their own team, with unsolved words hidden.
    Player {
        team_id: Option<TeamId>,
        direction: Direction,
    },
    /// Admin watchers see every team with all words.
    Admin,
}

impl Viewer {
    fn of(info: &ConnectionInfo) -> Self {
        match info.role {
            Role::Player => Viewer::Player {
                team_id: info.team_id,
                direction: info.direction,
            },
            Role::AdminWatcher => Viewer::Admin,
        }
    }
}

async fn lock_visible_teams(game: &LobbyGame, viewer: Viewer) -> Vec<MutexGuard<'_, ()>> {
    match viewer {
        Viewer::Admin => game.lock_all_teams().await,
        Viewer::Player {
            team_id: Some(team_id),
            ..
        } => match game.teams.get(&team_id) {
            Some(slot) => vec![slot.lock.lock().await],
            None => Vec::new(),
        },
        Viewer::Player { team_id: None, .. } => Vec::new(),
    }
}

impl Coordinator {
    /// Send a fresh `state_snapshot` to `handle`. Returns whether it was queued.
    pub async fn resync(&self, handle: &ConnectionHandle) -> Result<bool, CoordinatorError> {
        let Some(info) = self.registry.lookup(handle).await else {
            return Ok(false);
        };
        let viewer = Viewer::of(&info);
        let game = self.game(info.lobby_id).await;
        let _guards = match game.as_deref() {
            Some(game) => lock_visible_teams(game, viewer).await,
            None => Vec::new(),
        };
        let snapshot = self
            .build_snapshot(info.lobby_id, game.as_deref(), viewer)
            .await?;
        tracing::debug!(
            lobby_id = info.lobby_id,
            connection_id = handle.connection_id,
            phase = %snapshot.phase,
            "Sending state snapshot"
        );
        Ok(self
            .router
            .send_to_connection(handle, &ServerMessage::StateSnapshot(Box::new(snapshot)))
            .await)
    }

    /// Every team of a lobby with all words, as admin watchers see it.
    pub async fn admin_snapshot(
        &self,
        lobby_id: LobbyId,
    ) -> Result<StateSnapshotMsg, CoordinatorError> {
        self.store.find_lobby(lobby_id).map_err(|e| match e {
            StoreError::NotFound(_) => CoordinatorError::UnknownLobby(lobby_id),
            other => CoordinatorError::Store(other),
        })?;
        let game = self.game(lobby_id).await;
        let _guards = match game.as_deref() {
            Some(game) => lock_visible_teams(game, Viewer::Admin).await,
            None => Vec::new(),
        };
        self.build_snapshot(lobby_id, game.as_deref(), Viewer::Admin)
            .await
    }

    async fn build_snapshot(
        &self,
        lobby_id: LobbyId,
        game: Option<&LobbyGame>,
        viewer: Viewer,
    ) -> Result<StateSnapshotMsg, CoordinatorError> {
        let Some(game) = game else {
            return Ok(StateSnapshotMsg {
                lobby_id,
                phase: LobbyPhase::Forming,
                winning_team_id: None,
                winning_team_name: None,
                team: None,
                teams: Vec::new(),
                timer_ends_at: None,
                results: Vec::new(),
            });
        };

        let (phase, placements, results) = {
            let standings = game.standings.lock().await;
            (
                standings.phase,
                standings.placements.clone(),
                standings.results.clone(),
            )
        };
        let winning_team_id = placements.first().copied();
        let winning_team_name = winning_team_id.map(|id| game.team_name(id));

        let mut team = None;
        let mut teams = Vec::new();
        match viewer {
            Viewer::Admin => {
                for &team_id in game.teams.keys() {
                    teams.push(
                        self.team_view(lobby_id, game, team_id, &placements, Direction::Down, true)
                            .await?,
                    );
                }
            },
            Viewer::Player {
                team_id: Some(team_id),
                direction,
            } if game.teams.contains_key(&team_id) => {
                team = Some(
                    self.team_view(lobby_id, game, team_id, &placements, direction, false)
                        .await?,
                );
            },
            Viewer::Player { .. } => {},
        }

        Ok(StateSnapshotMsg {
            lobby_id,
            phase,
            winning_team_id,
            winning_team_name,
            team,
            teams,
            timer_ends_at: game.timer_ends_at,
            results,
        })
    }

    async fn team_view(
        &self,
        lobby_id: LobbyId,
        game: &LobbyGame,
        team_id: TeamId,
        placements: &[TeamId],
        direction: Direction,
        show_all_words: bool,
    ) -> Result<TeamView, CoordinatorError> {
        let len = game.puzzle.len();
        let progress = self
            .store
            .load_team_progress(team_id)?
            .unwrap_or_else(|| TeamProgress::seeded(&game.puzzle, 0));

        let steps = game
            .puzzle
            .ladder
            .iter()
            .enumerate()
            .map(|(index, step)| StepView {
                index,
                word: (show_all_words || progress.is_revealed(index)).then(|| step.word.clone()),
                clue: step.clue.clone(),
                transform: step.transform.clone(),
            })
            .collect();

        let mut members = Vec::new();
        for player in self.store.list_team_members(team_id)? {
            let connected = self
                .registry
                .handle_for_player(lobby_id, &player.session_id)
                .await
                .is_some();
            members.push(TeamMember {
                player_session_id: player.session_id,
                name: player.name,
                connected,
            });
        }

        Ok(TeamView {
            team_id,
            team_name: game.team_name(team_id),
            puzzle_title: game.puzzle.meta.title.clone(),
            steps,
            revealed_steps: progress.revealed_vec(),
            is_completed: progress.is_completed,
            last_updated_at: progress.last_updated_at,
            active_step: progress.active_step(direction, len),
            placement: placements
                .iter()
                .position(|id| *id == team_id)
                .map(|i| i as u32 + 1),
            members,
        })
    }
}

#[cfg(test)]
mod tests {
    use ladder_core::net::messages::ServerMessage;
    use ladder_core::player::Direction;

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use crate::test_support::{Harness, drain};

    use super::*;

    /// Resync `handle` and take the snapshot off its queue.
    async fn snapshot_of(
        h: &Harness,
        handle: &ConnectionHandle,
        rx: &mut mpsc::Receiver<Bytes>,
    ) -> StateSnapshotMsg {
        drain(rx);
        assert!(h.coordinator.resync(handle).await.unwrap());
        match drain(rx).pop() {
            Some(ServerMessage::StateSnapshot(snapshot)) => *snapshot,
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn forming_lobby_snapshot_has_no_team_view() {
        let h = Harness::new();
        let (handle, mut rx) = h.connect("a1").await;

        assert!(h.coordinator.resync(&handle).await.unwrap());
        let msgs = drain(&mut rx);
        let ServerMessage::StateSnapshot(snapshot) = &msgs[0] else {
            panic!("expected snapshot, got {msgs:?}");
        };
        assert_eq!(snapshot.phase, LobbyPhase::Forming);
        assert!(snapshot.team.is_none());
        assert!(snapshot.teams.is_empty());
    }

    #[tokio::test]
    async fn player_snapshot_hides_unsolved_words() {
        let h = Harness::started().await;
        let (handle, mut rx) = h.connect("a1").await;

        let snapshot = snapshot_of(&h, &handle, &mut rx).await;
        assert_eq!(snapshot.phase, LobbyPhase::InProgress);
        assert!(snapshot.teams.is_empty());
        let team = snapshot.team.unwrap();
        assert_eq!(team.team_id, 10);
        assert_eq!(team.revealed_steps, vec![0, 3]);
        assert_eq!(team.steps[0].word.as_deref(), Some("START"));
        assert_eq!(team.steps[1].word, None);
        assert_eq!(team.steps[1].clue.as_deref(), Some("Look fixedly"));
        assert_eq!(team.active_step, 1);
        assert_eq!(team.placement, None);
    }

    #[tokio::test]
    async fn direction_moves_active_step() {
        let h = Harness::started().await;
        let (handle, mut rx) = h.connect("a1").await;
        h.coordinator
            .registry()
            .set_direction(&handle, Direction::Up)
            .await;

        let snapshot = snapshot_of(&h, &handle, &mut rx).await;
        assert_eq!(snapshot.team.unwrap().active_step, 2);
    }

    #[tokio::test]
    async fn snapshot_reflects_accepted_guess() {
        let h = Harness::started().await;
        let (handle, mut rx) = h.connect("a1").await;
        h.coordinator
            .submit_guess(&handle, 1, "stare")
            .await
            .unwrap();

        let snapshot = snapshot_of(&h, &handle, &mut rx).await;
        let team = snapshot.team.unwrap();
        assert_eq!(team.revealed_steps, vec![0, 1, 3]);
        assert_eq!(team.steps[1].word.as_deref(), Some("STARE"));
        assert_eq!(team.active_step, 2);
    }

    #[tokio::test]
    async fn other_team_progress_is_not_visible() {
        let h = Harness::started().await;
        let (a1, _rx_a) = h.connect("a1").await;
        let (b1, mut rx_b) = h.connect("b1").await;
        h.coordinator.submit_guess(&a1, 1, "STARE").await.unwrap();

        let snapshot = snapshot_of(&h, &b1, &mut rx_b).await;
        assert_eq!(snapshot.team.unwrap().revealed_steps, vec![0, 3]);
    }

    #[tokio::test]
    async fn admin_snapshot_shows_every_team_fully() {
        let h = Harness::started().await;
        let snapshot = h.coordinator.admin_snapshot(1).await.unwrap();
        assert!(snapshot.team.is_none());
        let ids: Vec<TeamId> = snapshot.teams.iter().map(|t| t.team_id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert!(snapshot.teams[0].steps.iter().all(|s| s.word.is_some()));
    }

    #[tokio::test]
    async fn admin_snapshot_unknown_lobby() {
        let h = Harness::new();
        assert_eq!(
            h.coordinator.admin_snapshot(99).await,
            Err(CoordinatorError::UnknownLobby(99))
        );
    }

    #[tokio::test]
    async fn winner_and_placement_after_completion() {
        let h = Harness::started().await;
        let (a1, mut rx) = h.connect("a1").await;
        h.coordinator.submit_guess(&a1, 1, "STARE").await.unwrap();
        h.coordinator.submit_guess(&a1, 2, "SHARE").await.unwrap();

        let snapshot = snapshot_of(&h, &a1, &mut rx).await;
        assert_eq!(snapshot.winning_team_id, Some(10));
        assert_eq!(snapshot.winning_team_name.as_deref(), Some("Red"));
        let team = snapshot.team.unwrap();
        assert!(team.is_completed);
        assert_eq!(team.placement, Some(1));
    }

    #[tokio::test]
    async fn departed_handle_gets_nothing() {
        let h = Harness::started().await;
        let (handle, mut rx) = h.connect("a1").await;
        h.coordinator.registry().unregister(&handle).await;
        assert!(!h.coordinator.resync(&handle).await.unwrap());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn team_view_lists_members_with_presence() {
        let h = Harness::started().await;
        let (a1, mut rx) = h.connect("a1").await;

        let members = snapshot_of(&h, &a1, &mut rx).await.team.unwrap().members;
        let summary: Vec<(&str, &str, bool)> = members
            .iter()
            .map(|m| (m.player_session_id.as_str(), m.name.as_str(), m.connected))
            .collect();
        assert_eq!(summary, vec![("a1", "Ann", true), ("a2", "Abe", false)]);
    }

    #[tokio::test]
    async fn snapshot_carries_timer_and_results() {
        let h = Harness::new();
        let (a1, mut rx) = h.connect("a1").await;
        let started = h
            .coordinator
            .start_game(1, Some(std::time::Duration::from_secs(60)))
            .await
            .unwrap();
        let snapshot = snapshot_of(&h, &a1, &mut rx).await;
        assert_eq!(snapshot.timer_ends_at, started.timer_ends_at);
        assert!(snapshot.results.is_empty());

        h.coordinator.end_game(1).await.unwrap();
        let snapshot = snapshot_of(&h, &a1, &mut rx).await;
        assert_eq!(snapshot.phase, LobbyPhase::Completed);
        assert_eq!(snapshot.results.len(), 2);
        assert_eq!(
            h.coordinator.admin_snapshot(1).await.unwrap().results,
            snapshot.results
        );
    }
}
