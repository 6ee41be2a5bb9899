use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tumpang_core::domain::RideStatus;

#[derive(Debug, Error)]
pub enum RideError {
    #[error("ride not found")]
    NotFound,
    #[error("operation is not valid while the ride is {}", .0.as_str())]
    InvalidState(RideStatus),
    #[error("driver is {distance_m:.0} m from the passenger, too far to start")]
    TooFar { distance_m: f64 },
    #[error("no payment exists for this ride yet")]
    PaymentNotFound,
    #[error("submitted total does not match the adjusted cost")]
    PaymentMismatch,
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

impl From<RideError> for AppError {
    fn from(err: RideError) -> Self {
        match &err {
            RideError::NotFound | RideError::PaymentNotFound => {
                AppError::new(StatusCode::NOT_FOUND, err.to_string())
            }
            RideError::InvalidState(_) => AppError::new(StatusCode::CONFLICT, err.to_string()),
            RideError::TooFar { .. } | RideError::PaymentMismatch => {
                AppError::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            RideError::Store(inner) => {
                tracing::error!(error = format!("{inner:#}"), "ride store failure");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "Operation failed")
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
