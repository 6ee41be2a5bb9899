use crate::error::{AppError, AppResult};
use crate::state::AppState;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tumpang_core::domain::{Location, Payment, PaymentRequest, Ride};
use tumpang_core::events::{PaymentProcessRequest, PaymentVerdict, RideStartRequest};
use uuid::Uuid;

const READY_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/rides/{ride_id}/start", post(start_ride))
        .route("/v1/rides/{ride_id}/arrive", post(ride_arrived))
        .route("/v1/rides/{ride_id}/payment", post(process_payment))
        .route("/v1/rides/{ride_id}/cancel", post(cancel_ride))
        .with_state(state)
}

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

#[derive(Debug, Deserialize)]
struct StartBody {
    driver_location: Location,
    passenger_location: Location,
}

async fn start_ride(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(ride_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<StartBody>,
) -> AppResult<Json<Ride>> {
    require_api_key(&headers, &state.config.api_key, addr, "/v1/rides/start")?;
    let ride = state
        .lifecycle
        .start_ride(RideStartRequest {
            ride_id,
            driver_location: body.driver_location,
            passenger_location: body.passenger_location,
        })
        .await?;
    Ok(Json(ride))
}

#[derive(Debug, Deserialize)]
struct ArriveBody {
    adjustment_factor: f64,
}

async fn ride_arrived(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(ride_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ArriveBody>,
) -> AppResult<Json<PaymentRequest>> {
    require_api_key(&headers, &state.config.api_key, addr, "/v1/rides/arrive")?;
    let request = state
        .lifecycle
        .ride_arrived(ride_id, body.adjustment_factor)
        .await?;
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
struct PaymentBody {
    total_cost: i64,
    status: PaymentVerdict,
}

#[derive(Debug, serde::Serialize)]
struct PaymentOutcome {
    ride: Ride,
    payment: Payment,
}

async fn process_payment(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(ride_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<PaymentBody>,
) -> AppResult<Json<PaymentOutcome>> {
    require_api_key(&headers, &state.config.api_key, addr, "/v1/rides/payment")?;
    let (ride, payment) = state
        .lifecycle
        .process_payment(PaymentProcessRequest {
            ride_id,
            total_cost: body.total_cost,
            status: body.status,
        })
        .await?;
    Ok(Json(PaymentOutcome { ride, payment }))
}

async fn cancel_ride(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(ride_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Ride>> {
    require_api_key(&headers, &state.config.api_key, addr, "/v1/rides/cancel")?;
    let ride = state.lifecycle.cancel_ride(ride_id).await?;
    Ok(Json(ride))
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
