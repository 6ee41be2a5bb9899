use crate::auth::{bearer_token, AuthenticatedUser};
use crate::error::GatewayError;
use crate::registry::Frame;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tumpang_core::bus::subject;
use tumpang_core::domain::{Location, UserRole};
use tumpang_core::events::{
    BeaconEvent, EventEnvelope, FinderEvent, LocationUpdateEvent, MatchConfirmRequest,
    MatchConfirmVerdict, PaymentVerdict,
};
use uuid::Uuid;

const WRITE_DEADLINE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    token: Option<String>,
}

/// Authenticated upgrade. Browsers cannot set headers on WebSocket
/// requests, so a `token` query parameter is accepted as a fallback to
/// the Authorization header.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
        .or(query.token);

    let Some(token) = token else {
        let err = GatewayError::security("ws_auth", format!("missing token from {addr} on /v1/ws"));
        return err.into_response();
    };
    let user = match state.jwt.verify(&token) {
        Ok(user) => user,
        Err(err) => {
            tracing::warn!(caller = %addr, path = "/v1/ws", detail = err.detail(), "websocket auth failed");
            return err.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, user, socket))
}

async fn handle_socket(state: AppState, user: AuthenticatedUser, socket: WebSocket) {
    let registration = state.registry.register(user.id);
    let generation = registration.generation;
    let cancel = registration.cancel.clone();
    let mut outbound = registration.outbound;
    tracing::info!(user_id = %user.id, role = user.role.as_str(), "client connected");

    let (mut sink, mut stream) = socket.split();

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    let payload = match serde_json::to_string(&frame) {
                        Ok(payload) => payload,
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize outbound frame");
                            continue;
                        }
                    };
                    let send = sink.send(Message::Text(payload.into()));
                    match tokio::time::timeout(WRITE_DEADLINE, send).await {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) | Err(_) => break,
                    }
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = stream.next() => {
                let Some(Ok(message)) = message else { break };
                match message {
                    Message::Text(text) => {
                        if let Some(frame) = dispatch(&state, &user, text.as_str()).await {
                            state.registry.send(user.id, frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    // Pings are answered by the library; binary frames are
                    // not part of the protocol.
                    _ => {}
                }
            }
        }
    }

    cancel.cancel();
    writer.abort();
    state.registry.unregister(user.id, generation);
    tracing::info!(user_id = %user.id, "client disconnected");
}

/// Handle one inbound frame. Every failure becomes an in-band error
/// frame; the connection always stays open.
async fn dispatch(state: &AppState, user: &AuthenticatedUser, text: &str) -> Option<Frame> {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            let error = GatewayError::client("malformed_envelope", format!("malformed envelope: {err}"));
            error.log("ws frame rejected");
            return Some(Frame::error(error.code, error.public_message()));
        }
    };

    match handle_event(state, user, &frame.event, frame.data).await {
        Ok(reply) => reply,
        Err(error) => {
            error.log(&format!("ws event {} failed", frame.event));
            Some(Frame::error(error.code, error.public_message()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct BeaconData {
    is_active: bool,
    location: Location,
}

#[derive(Debug, Deserialize)]
struct FinderData {
    is_active: bool,
    location: Location,
    target_location: Location,
}

#[derive(Debug, Deserialize)]
struct LocationData {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct ConfirmData {
    match_id: Uuid,
    status: MatchConfirmVerdict,
}

#[derive(Debug, Deserialize)]
struct RideStartData {
    ride_id: Uuid,
    driver_location: Location,
    passenger_location: Location,
}

#[derive(Debug, Deserialize)]
struct RideArrivedData {
    ride_id: Uuid,
    adjustment_factor: f64,
}

#[derive(Debug, Deserialize)]
struct PaymentData {
    ride_id: Uuid,
    total_cost: i64,
    status: PaymentVerdict,
}

fn parse<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, GatewayError> {
    serde_json::from_value(data)
        .map_err(|err| GatewayError::client("invalid_payload", format!("invalid payload: {err}")))
}

fn require_role(user: &AuthenticatedUser, role: UserRole, event: &str) -> Result<(), GatewayError> {
    if user.role == role {
        Ok(())
    } else {
        Err(GatewayError::security(
            "role_mismatch",
            format!("user {} ({}) sent {event}", user.id, user.role.as_str()),
        ))
    }
}

async fn handle_event(
    state: &AppState,
    user: &AuthenticatedUser,
    event: &str,
    data: serde_json::Value,
) -> Result<Option<Frame>, GatewayError> {
    match event {
        "beacon_update" => {
            require_role(user, UserRole::Driver, event)?;
            let body: BeaconData = parse(data)?;
            state
                .publisher
                .publish(
                    subject::USER_BEACON,
                    &EventEnvelope::new(BeaconEvent {
                        user_id: user.id,
                        is_active: body.is_active,
                        location: body.location,
                    }),
                )
                .await
                .map_err(|err| GatewayError::server("publish_beacon", format!("{err:#}")))?;
            Ok(None)
        }
        "finder_update" => {
            require_role(user, UserRole::Passenger, event)?;
            let body: FinderData = parse(data)?;
            state
                .publisher
                .publish(
                    subject::USER_FINDER,
                    &EventEnvelope::new(FinderEvent {
                        user_id: user.id,
                        is_active: body.is_active,
                        location: body.location,
                        target_location: body.target_location,
                    }),
                )
                .await
                .map_err(|err| GatewayError::server("publish_finder", format!("{err:#}")))?;
            Ok(None)
        }
        "location_update" => {
            require_role(user, UserRole::Driver, event)?;
            let body: LocationData = parse(data)?;
            state
                .publisher
                .publish(
                    subject::LOCATION_UPDATE,
                    &EventEnvelope::new(LocationUpdateEvent {
                        user_id: user.id,
                        location: body.location,
                    }),
                )
                .await
                .map_err(|err| GatewayError::server("publish_location", format!("{err:#}")))?;
            Ok(None)
        }
        "match_confirm" => {
            let body: ConfirmData = parse(data)?;
            let proposal = state
                .upstream
                .confirm_match(&MatchConfirmRequest {
                    match_id: body.match_id,
                    user_id: user.id,
                    role: user.role,
                    status: body.status,
                })
                .await?;
            Ok(Some(
                Frame::new("match_confirm", &proposal)
                    .map_err(|err| GatewayError::server("encode_frame", err.to_string()))?,
            ))
        }
        "ride_started" => {
            require_role(user, UserRole::Driver, event)?;
            let body: RideStartData = parse(data)?;
            let ride = state
                .upstream
                .start_ride(body.ride_id, &body.driver_location, &body.passenger_location)
                .await?;
            Ok(Some(
                Frame::new("ride_started", &ride)
                    .map_err(|err| GatewayError::server("encode_frame", err.to_string()))?,
            ))
        }
        "ride_arrived" => {
            require_role(user, UserRole::Driver, event)?;
            let body: RideArrivedData = parse(data)?;
            let request = state
                .upstream
                .ride_arrived(body.ride_id, body.adjustment_factor)
                .await?;
            Ok(Some(
                Frame::new("ride_arrived", &request)
                    .map_err(|err| GatewayError::server("encode_frame", err.to_string()))?,
            ))
        }
        "payment_processed" => {
            require_role(user, UserRole::Passenger, event)?;
            let body: PaymentData = parse(data)?;
            let outcome = state
                .upstream
                .process_payment(body.ride_id, body.total_cost, body.status)
                .await?;
            Ok(Some(
                Frame::new("payment_processed", &outcome)
                    .map_err(|err| GatewayError::server("encode_frame", err.to_string()))?,
            ))
        }
        other => Err(GatewayError::client(
            "unknown_event",
            format!("unknown event {other}"),
        )),
    }
}
