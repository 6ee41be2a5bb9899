use crate::ports::RideNotifier;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tumpang_core::bus::{subject, Publisher};
use tumpang_core::domain::{Payment, PaymentRequest, Ride};
use tumpang_core::events::{EventEnvelope, RideArrivedEvent, RideCompletedEvent, RideEvent};
use uuid::Uuid;

/// Envelope ids are derived from (event kind, ride id), so a redelivered
/// bus message that replays a publish collapses in the broker's
/// duplicate window instead of fanning out twice.
fn event_id(kind: &str, ride_id: Uuid) -> Uuid {
    let name = format!("{kind}:{ride_id}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

fn envelope<T>(kind: &str, ride_id: Uuid, data: T) -> EventEnvelope<T> {
    EventEnvelope {
        id: event_id(kind, ride_id),
        ts: Utc::now(),
        data,
    }
}

pub struct BusRideNotifier {
    publisher: Publisher,
}

impl BusRideNotifier {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl RideNotifier for BusRideNotifier {
    async fn ride_pickup(&self, ride: &Ride) -> Result<()> {
        self.publisher
            .publish(
                subject::RIDE_PICKUP,
                &envelope("ride.pickup", ride.id, RideEvent { ride: ride.clone() }),
            )
            .await
    }

    async fn ride_started(&self, ride: &Ride) -> Result<()> {
        self.publisher
            .publish(
                subject::RIDE_STARTED,
                &envelope("ride.started", ride.id, RideEvent { ride: ride.clone() }),
            )
            .await
    }

    async fn ride_arrived(&self, ride: &Ride, request: &PaymentRequest) -> Result<()> {
        self.publisher
            .publish(
                subject::RIDE_ARRIVED,
                &envelope(
                    "ride.arrived",
                    ride.id,
                    RideArrivedEvent {
                        ride: ride.clone(),
                        payment_request: request.clone(),
                    },
                ),
            )
            .await
    }

    async fn ride_completed(&self, ride: &Ride, payment: &Payment) -> Result<()> {
        self.publisher
            .publish(
                subject::RIDE_COMPLETED,
                &envelope(
                    "ride.completed",
                    ride.id,
                    RideCompletedEvent {
                        ride: ride.clone(),
                        payment: payment.clone(),
                    },
                ),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_stable_per_kind_and_ride() {
        let ride = Uuid::new_v4();
        assert_eq!(event_id("ride.pickup", ride), event_id("ride.pickup", ride));
        assert_ne!(event_id("ride.pickup", ride), event_id("ride.completed", ride));
        assert_ne!(
            event_id("ride.pickup", ride),
            event_id("ride.pickup", Uuid::new_v4())
        );
    }
}
