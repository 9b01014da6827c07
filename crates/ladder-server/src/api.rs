use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use ladder_core::lobby::{LobbyId, TeamId};
use ladder_core::net::messages::{
    GameStartedMsg, PlayerKickedMsg, StateSnapshotMsg, TeamChangedMsg, TeamsAssignedMsg,
};

use crate::error::AppError;
use crate::state::AppState;

/// Request body for `POST lobbies/{id}/teams`.
#[derive(Debug, Deserialize)]
pub struct AssignTeamsBody {
    pub team_count: usize,
}

/// Query for `POST lobbies/{id}/start`. Without `duration_secs` the round
/// runs until every team finishes or an admin ends it.
#[derive(Debug, Default, Deserialize)]
pub struct StartGameParams {
    pub duration_secs: Option<u64>,
}

/// Request body for `PUT players/{session_id}/team`. A null `team_id` unassigns.
#[derive(Debug, Deserialize)]
pub struct ReassignBody {
    pub team_id: Option<TeamId>,
}

/// Acknowledgement for lifecycle actions that return no payload.
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub lobby_id: LobbyId,
    pub phase: &'static str,
}

/// POST /api/v1/admin/lobbies/{lobby_id}/start
pub async fn start_game(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
    Query(params): Query<StartGameParams>,
) -> Result<Json<GameStartedMsg>, AppError> {
    tracing::info!(lobby_id, duration_secs = ?params.duration_secs, "Admin: start game");
    let round_timer = params.duration_secs.map(Duration::from_secs);
    Ok(Json(state.coordinator.start_game(lobby_id, round_timer).await?))
}

/// POST /api/v1/admin/lobbies/{lobby_id}/end
pub async fn end_game(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
) -> Result<Json<LifecycleResponse>, AppError> {
    tracing::info!(lobby_id, "Admin: end game");
    state.coordinator.end_game(lobby_id).await?;
    Ok(Json(LifecycleResponse {
        lobby_id,
        phase: state.coordinator.phase(lobby_id).await.as_str(),
    }))
}

/// POST /api/v1/admin/lobbies/{lobby_id}/reset
pub async fn reset_game(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
) -> Result<Json<LifecycleResponse>, AppError> {
    tracing::info!(lobby_id, "Admin: reset game");
    state.coordinator.reset_game(lobby_id).await?;
    Ok(Json(LifecycleResponse {
        lobby_id,
        phase: state.coordinator.phase(lobby_id).await.as_str(),
    }))
}

/// DELETE /api/v1/admin/lobbies/{lobby_id}
pub async fn delete_lobby(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
) -> Result<StatusCode, AppError> {
    tracing::info!(lobby_id, "Admin: delete lobby");
    state.coordinator.delete_lobby(lobby_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/lobbies/{lobby_id}/teams
pub async fn assign_teams(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
    Json(body): Json<AssignTeamsBody>,
) -> Result<(StatusCode, Json<TeamsAssignedMsg>), AppError> {
    tracing::info!(lobby_id, team_count = body.team_count, "Admin: assign teams");
    let assigned = state
        .coordinator
        .assign_teams(lobby_id, body.team_count)
        .await?;
    Ok((StatusCode::CREATED, Json(assigned)))
}

/// GET /api/v1/admin/lobbies/{lobby_id}/state
pub async fn lobby_state(
    State(state): State<AppState>,
    Path(lobby_id): Path<LobbyId>,
) -> Result<Json<StateSnapshotMsg>, AppError> {
    Ok(Json(state.coordinator.admin_snapshot(lobby_id).await?))
}

/// DELETE /api/v1/admin/players/{session_id}
pub async fn kick_player(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<PlayerKickedMsg>, AppError> {
    tracing::info!(player_session_id = %session_id, "Admin: kick player");
    Ok(Json(state.coordinator.kick_player(&session_id).await?))
}

/// PUT /api/v1/admin/players/{session_id}/team
pub async fn reassign_player(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ReassignBody>,
) -> Result<Json<TeamChangedMsg>, AppError> {
    tracing::info!(
        player_session_id = %session_id,
        team_id = ?body.team_id,
        "Admin: reassign player"
    );
    Ok(Json(
        state
            .coordinator
            .reassign_player(&session_id, body.team_id)
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassign_body_accepts_null_team() {
        let body: ReassignBody = serde_json::from_str(r#"{"team_id": null}"#).unwrap();
        assert_eq!(body.team_id, None);
        let body: ReassignBody = serde_json::from_str(r#"{"team_id": 7}"#).unwrap();
        assert_eq!(body.team_id, Some(7));
    }

    #[test]
    fn assign_body_requires_count() {
        assert!(serde_json::from_str::<AssignTeamsBody>("{}").is_err());
        let body: AssignTeamsBody = serde_json::from_str(r#"{"team_count": 3}"#).unwrap();
        assert_eq!(body.team_count, 3);
    }
}
