use crate::error::{AppError, AppResult};
use crate::state::AppState;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tumpang_core::domain::MatchProposal;
use tumpang_core::events::MatchConfirmRequest;

const READY_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/matches/confirm", post(confirm))
        .with_state(state)
}

/// Service callers authenticate with the shared per-service key. Failures
/// are security errors: logged with the caller's address and path,
/// surfaced as a bare "Access denied".
pub(crate) fn require_api_key(
    headers: &HeaderMap,
    expected: &str,
    addr: SocketAddr,
    path: &str,
) -> Result<(), AppError> {
    let presented = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if presented == Some(expected) {
        return Ok(());
    }
    tracing::warn!(caller = %addr, path, "request with missing or invalid API key");
    Err(AppError::unauthorized("Access denied"))
}

async fn confirm(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<MatchConfirmRequest>,
) -> AppResult<Json<MatchProposal>> {
    require_api_key(&headers, &state.config.api_key, addr, "/v1/matches/confirm")?;
    let updated = state.engine.confirm(request).await?;
    Ok(Json(updated))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let db_check = tokio::time::timeout(
        READY_CHECK_TIMEOUT,
        sqlx::query("SELECT 1").execute(&state.db),
    );
    if !matches!(db_check.await, Ok(Ok(_))) {
        return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable");
    }

    let mut conn = state.redis.clone();
    let ping_cmd = redis::cmd("PING");
    let redis_check = tokio::time::timeout(
        READY_CHECK_TIMEOUT,
        ping_cmd.query_async::<String>(&mut conn),
    );
    if !matches!(redis_check.await, Ok(Ok(_))) {
        return (StatusCode::SERVICE_UNAVAILABLE, "redis unavailable");
    }

    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn missing_key_is_denied() {
        let headers = HeaderMap::new();
        let err = require_api_key(&headers, "secret", addr(), "/v1/matches/confirm").unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "Access denied");
    }

    #[test]
    fn wrong_key_is_denied() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "guess".parse().unwrap());
        assert!(require_api_key(&headers, "secret", addr(), "/").is_err());
    }

    #[test]
    fn correct_key_passes() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        assert!(require_api_key(&headers, "secret", addr(), "/").is_ok());
    }
}
