use crate::error::{GatewayError, GatewayResult};
use crate::otp;
use crate::state::AppState;
use crate::ws;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tumpang_core::domain::{User, UserRole};
use tumpang_core::msisdn;

const READY_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/login", post(login))
        .route("/v1/verify", post(verify))
        .route("/v1/ws", get(ws::ws_upgrade))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    msisdn: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    message: &'static str,
}

/// Step one of registration: validate the number and stash a short-lived
/// OTP. Delivery is out of scope; the code lands in the service log.
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> GatewayResult<Json<LoginResponse>> {
    let canonical = msisdn::normalize(&body.msisdn)
        .map_err(|err| GatewayError::client("invalid_msisdn", err.to_string()))?;

    let code = otp::generate_code();
    state.otp.issue(&canonical, &code).await?;
    tracing::info!(msisdn = %canonical, otp = %code, "otp issued");

    Ok(Json(LoginResponse {
        message: "otp sent",
    }))
}

#[derive(Debug, Deserialize)]
struct VerifyBody {
    msisdn: String,
    otp: String,
    role: UserRole,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    token: String,
    user: User,
}

/// Step two: consume the OTP, upsert the user, hand back a bearer token.
async fn verify(
    State(state): State<AppState>,
    Json(body): Json<VerifyBody>,
) -> GatewayResult<Json<VerifyResponse>> {
    let canonical = msisdn::normalize(&body.msisdn)
        .map_err(|err| GatewayError::client("invalid_msisdn", err.to_string()))?;

    if !state.otp.consume(&canonical, body.otp.trim()).await? {
        return Err(GatewayError::security(
            "otp_mismatch",
            format!("otp mismatch for {canonical}"),
        ));
    }

    let user = state
        .users
        .upsert(&canonical, body.role)
        .await
        .map_err(|err| GatewayError::server("user_upsert", format!("{err:#}")))?;
    let token = state.jwt.issue(&user)?;
    tracing::info!(user_id = %user.id, role = user.role.as_str(), "user verified");

    Ok(Json(VerifyResponse { token, user }))
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
