use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tumpang_core::domain::MatchStatus;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("match not found")]
    NotFound,
    #[error("user is not a participant in this match")]
    NotParticipant,
    #[error("role does not match the user's side of this match")]
    RoleMismatch,
    #[error("confirmation is not valid while the match is {}", .0.as_str())]
    InvalidState(MatchStatus),
    #[error("a participant already has an active ride")]
    ActiveRideExists,
    #[error("confirmation raced with a concurrent update")]
    Conflict,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl From<MatchError> for AppError {
    fn from(err: MatchError) -> Self {
        match &err {
            MatchError::NotFound => AppError::new(StatusCode::NOT_FOUND, err.to_string()),
            MatchError::NotParticipant | MatchError::RoleMismatch => {
                AppError::new(StatusCode::FORBIDDEN, err.to_string())
            }
            MatchError::InvalidState(_) | MatchError::ActiveRideExists => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            MatchError::Conflict => AppError::new(StatusCode::CONFLICT, err.to_string()),
            MatchError::Store(inner) => {
                tracing::error!(error = format!("{inner:#}"), "match store failure");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "Operation failed")
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
