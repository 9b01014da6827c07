pub mod api;
pub mod auth;
pub mod broadcast;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod registry;
pub mod resync;
pub mod state;
pub mod store;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::ServerConfig;
use state::AppState;
use store::LobbyStore;

/// Build the Axum router and application state from a config and a store.
pub fn build_app(config: ServerConfig, store: Arc<dyn LobbyStore>) -> (Router<()>, AppState) {
    let web_root = config.web_root.clone();
    let state = AppState::new(config, store);

    // Admin routes (behind bearer auth middleware)
    let admin_routes = Router::new()
        .route("/lobbies/{lobby_id}", delete(api::delete_lobby))
        .route("/lobbies/{lobby_id}/start", post(api::start_game))
        .route("/lobbies/{lobby_id}/end", post(api::end_game))
        .route("/lobbies/{lobby_id}/reset", post(api::reset_game))
        .route("/lobbies/{lobby_id}/teams", post(api::assign_teams))
        .route("/lobbies/{lobby_id}/state", get(api::lobby_state))
        .route("/players/{session_id}", delete(api::kick_player))
        .route("/players/{session_id}/team", put(api::reassign_player))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_layer,
        ));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_check))
        .nest("/api/v1/admin", admin_routes)
        .fallback_service(ServeDir::new(&web_root))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

/// Middleware wrapper that injects AuthConfig into request extensions for the
/// bearer auth middleware.
async fn bearer_auth_layer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut request: axum::extract::Request,
    next: middleware::Next,
) -> Result<axum::response::Response, axum::http::StatusCode> {
    request.extensions_mut().insert(state.auth.clone());
    auth::bearer_auth_middleware(request.headers().clone(), request, next).await
}
