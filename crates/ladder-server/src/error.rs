use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::coordinator::CoordinatorError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Unavailable(m) => write!(f, "{m}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            Self::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            Self::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<CoordinatorError> for AppError {
    fn from(e: CoordinatorError) -> Self {
        let message = e.to_string();
        match e {
            CoordinatorError::UnknownLobby(_)
            | CoordinatorError::UnknownTeam(_)
            | CoordinatorError::UnknownPlayer(_) => Self::NotFound(message),
            CoordinatorError::InvalidTransition { .. }
            | CoordinatorError::NotForming(_)
            | CoordinatorError::NoTeams(_)
            | CoordinatorError::TeamsExist(_) => Self::Conflict(message),
            CoordinatorError::InvalidTeamCount { .. } | CoordinatorError::InvalidDuration => {
                Self::BadRequest(message)
            },
            CoordinatorError::Store(StoreError::NotFound(_)) => Self::NotFound(message),
            CoordinatorError::Store(StoreError::Unavailable(_)) => Self::Unavailable(message),
        }
    }
}
