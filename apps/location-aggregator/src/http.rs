use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::time::Duration;

const READY_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct HttpState {
    pub redis: redis::aio::ConnectionManager,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<HttpState>) -> (StatusCode, &'static str) {
    let mut conn = state.redis.clone();
    let ping_cmd = redis::cmd("PING");
    let ping = tokio::time::timeout(
        READY_CHECK_TIMEOUT,
        ping_cmd.query_async::<String>(&mut conn),
    )
    .await;
    match ping {
        Ok(Ok(_)) => (StatusCode::OK, "ok"),
        Ok(Err(_)) | Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "redis unavailable"),
    }
}
