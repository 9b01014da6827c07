use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: ConnectionCounts,
    pub lobbies: LobbyCounts,
}

#[derive(Serialize)]
pub struct ConnectionCounts {
    /// Open sockets, including ones still waiting to join.
    pub websocket: usize,
    /// Connections admitted to a lobby.
    pub registered: usize,
}

#[derive(Serialize)]
pub struct LobbyCounts {
    /// Lobbies with at least one live connection.
    pub connected: usize,
    /// Lobbies whose game is in progress.
    pub in_progress: usize,
}

/// Returns server status, connection counts and lobby counts as JSON.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let websocket = state.ws_connection_count.load(Ordering::Relaxed);
    let (connected, registered) = state.registry.stats().await;
    let in_progress = state.coordinator.active_games().await;

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionCounts {
            websocket,
            registered,
        },
        lobbies: LobbyCounts {
            connected,
            in_progress,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "healthy",
            version: "0.1.0",
            connections: ConnectionCounts {
                websocket: 5,
                registered: 4,
            },
            lobbies: LobbyCounts {
                connected: 2,
                in_progress: 1,
            },
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"healthy\""));
        assert!(json.contains("\"websocket\":5"));
        assert!(json.contains("\"in_progress\":1"));
    }
}
