use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::room::RegisterError;
use crate::room_manager::RoomError;
use crate::stats::StatsError;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(m) | Self::NotFound(m) | Self::Conflict(m) | Self::Internal(m) => {
                write!(f, "{m}")
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Conflict(m) => (StatusCode::CONFLICT, m),
            Self::Internal(m) => {
                tracing::error!(error = %m, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            },
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<RoomError> for AppError {
    fn from(e: RoomError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<RegisterError> for AppError {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::InvalidName => Self::BadRequest(e.to_string()),
            RegisterError::RoomClosed => Self::NotFound(e.to_string()),
        }
    }
}

impl From<StatsError> for AppError {
    fn from(e: StatsError) -> Self {
        match e {
            StatsError::UnknownCategory(_) => Self::BadRequest(e.to_string()),
            StatsError::UnknownGame(_) | StatsError::UnknownPlayer(_) => {
                Self::NotFound(e.to_string())
            },
        }
    }
}
