use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use ladder_core::lobby::LobbyId;
use ladder_core::player::{Affiliation, Role};

use crate::store::{LobbyStore, StoreError};

/// Authentication configuration shared by the admin HTTP routes and
/// WebSocket admin watchers.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Admin bearer token. None = admin auth disabled.
    pub admin_token: Option<String>,
}

impl AuthConfig {
    /// Whether `presented` grants admin access.
    pub fn admin_allowed(&self, presented: &str) -> bool {
        match self.admin_token {
            Some(ref expected) => presented == expected,
            None => true,
        }
    }
}

/// Why a credential could not be mapped to an affiliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    UnknownSession,
    InvalidAdminToken,
    UnknownLobby(LobbyId),
    Unavailable(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownSession => write!(f, "Unknown player session"),
            Self::InvalidAdminToken => write!(f, "Invalid admin token"),
            Self::UnknownLobby(id) => write!(f, "Unknown lobby {id}"),
            Self::Unavailable(e) => write!(f, "Authentication unavailable: {e}"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Map a player session id to the player's current affiliation.
pub fn authenticate_player(
    store: &dyn LobbyStore,
    player_session_id: &str,
) -> Result<Affiliation, AuthError> {
    if player_session_id.trim().is_empty() {
        return Err(AuthError::UnknownSession);
    }
    let player = store.find_player(player_session_id).map_err(|e| match e {
        StoreError::NotFound(_) => AuthError::UnknownSession,
        StoreError::Unavailable(e) => AuthError::Unavailable(e),
    })?;
    Ok(Affiliation {
        player_session_id: player.session_id,
        lobby_id: player.lobby_id,
        team_id: player.team_id,
        role: Role::Player,
    })
}

/// Admit an admin watcher to `lobby_id` under a fresh session handle.
pub fn authenticate_admin(
    auth: &AuthConfig,
    store: &dyn LobbyStore,
    token: &str,
    lobby_id: LobbyId,
) -> Result<Affiliation, AuthError> {
    if !auth.admin_allowed(token) {
        return Err(AuthError::InvalidAdminToken);
    }
    store.find_lobby(lobby_id).map_err(|e| match e {
        StoreError::NotFound(_) => AuthError::UnknownLobby(lobby_id),
        StoreError::Unavailable(e) => AuthError::Unavailable(e),
    })?;
    Ok(Affiliation {
        player_session_id: format!("admin-{}", uuid::Uuid::new_v4()),
        lobby_id,
        team_id: None,
        role: Role::AdminWatcher,
    })
}

/// Axum middleware that validates Bearer token authentication.
/// If no token is configured (`AuthConfig::admin_token` is None), all
/// requests are allowed through (auth disabled).
pub async fn bearer_auth_middleware(
    headers: HeaderMap,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_config = request
        .extensions()
        .get::<AuthConfig>()
        .cloned()
        .unwrap_or_default();

    if auth_config.admin_token.is_some() {
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match provided {
            Some(token) if auth_config.admin_allowed(token) => {},
            _ => return Err(StatusCode::UNAUTHORIZED),
        }
    }

    Ok(next.run(request).await)
}
