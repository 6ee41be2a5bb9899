use crate::registry::{ClientRegistry, Frame};
use async_nats::jetstream;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tumpang_core::bus::{self, ConsumerSpec};
use tumpang_core::events::{MatchEvent, RideArrivedEvent, RideCompletedEvent, RideEvent};
use uuid::Uuid;

/// Bus-to-client fan-out. Each subject gets its own durable; all are
/// deliver-new-only, since frames for users who were offline at publish
/// time are dropped anyway.
pub fn spawn(
    js: jetstream::Context,
    registry: Arc<ClientRegistry>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    // match.found goes to the proposed driver alone.
    {
        let registry = registry.clone();
        handles.push(tokio::spawn(bus::consume(
            js.clone(),
            ConsumerSpec {
                stream: bus::STREAM_MATCH,
                durable: "gateway-match-found",
                subject: bus::subject::MATCH_FOUND,
                deliver_new_only: true,
            },
            cancel.clone(),
            move |payload| {
                let registry = registry.clone();
                async move {
                    let envelope = bus::decode::<MatchEvent>(&payload)?;
                    let frame = Frame::new("match_found", &envelope.data)?;
                    registry.send(envelope.data.driver_id, frame).await;
                    Ok(())
                }
            },
        )));
    }

    // Accept/reject outcomes go to both sides as match_confirm frames.
    for (durable, subject) in [
        ("gateway-match-accepted", bus::subject::MATCH_ACCEPTED),
        ("gateway-match-rejected", bus::subject::MATCH_REJECTED),
    ] {
        let registry = registry.clone();
        handles.push(tokio::spawn(bus::consume(
            js.clone(),
            ConsumerSpec {
                stream: bus::STREAM_MATCH,
                durable,
                subject,
                deliver_new_only: true,
            },
            cancel.clone(),
            move |payload| {
                let registry = registry.clone();
                async move {
                    let envelope = bus::decode::<MatchEvent>(&payload)?;
                    let frame = Frame::new("match_confirm", &envelope.data)?;
                    fan_out(
                        &registry,
                        [envelope.data.driver_id, envelope.data.passenger_id],
                        frame,
                    )
                    .await;
                    Ok(())
                }
            },
        )));
    }

    // Ride milestones go to both participants.
    for (durable, subject, event) in [
        ("gateway-ride-pickup", bus::subject::RIDE_PICKUP, "ride_pickup"),
        ("gateway-ride-started", bus::subject::RIDE_STARTED, "ride_started"),
    ] {
        let registry = registry.clone();
        handles.push(tokio::spawn(bus::consume(
            js.clone(),
            ConsumerSpec {
                stream: bus::STREAM_RIDE,
                durable,
                subject,
                deliver_new_only: true,
            },
            cancel.clone(),
            move |payload| {
                let registry = registry.clone();
                async move {
                    let envelope = bus::decode::<RideEvent>(&payload)?;
                    let frame = Frame::new(event, &envelope.data.ride)?;
                    fan_out(
                        &registry,
                        [envelope.data.ride.driver_id, envelope.data.ride.passenger_id],
                        frame,
                    )
                    .await;
                    Ok(())
                }
            },
        )));
    }

    // Arrival turns into a payment request for the passenger alone.
    {
        let registry = registry.clone();
        handles.push(tokio::spawn(bus::consume(
            js.clone(),
            ConsumerSpec {
                stream: bus::STREAM_RIDE,
                durable: "gateway-ride-arrived",
                subject: bus::subject::RIDE_ARRIVED,
                deliver_new_only: true,
            },
            cancel.clone(),
            move |payload| {
                let registry = registry.clone();
                async move {
                    let envelope = bus::decode::<RideArrivedEvent>(&payload)?;
                    let frame = Frame::new("payment_request", &envelope.data.payment_request)?;
                    registry
                        .send(envelope.data.ride.passenger_id, frame)
                        .await;
                    Ok(())
                }
            },
        )));
    }

    {
        let registry = registry;
        handles.push(tokio::spawn(bus::consume(
            js,
            ConsumerSpec {
                stream: bus::STREAM_RIDE,
                durable: "gateway-ride-completed",
                subject: bus::subject::RIDE_COMPLETED,
                deliver_new_only: true,
            },
            cancel,
            move |payload| {
                let registry = registry.clone();
                async move {
                    let envelope = bus::decode::<RideCompletedEvent>(&payload)?;
                    let frame = Frame::new("ride_completed", &envelope.data)?;
                    fan_out(
                        &registry,
                        [envelope.data.ride.driver_id, envelope.data.ride.passenger_id],
                        frame,
                    )
                    .await;
                    Ok(())
                }
            },
        )));
    }

    handles
}

async fn fan_out(registry: &ClientRegistry, users: [Uuid; 2], frame: Frame) {
    for user_id in users {
        registry.send(user_id, frame.clone()).await;
    }
}
