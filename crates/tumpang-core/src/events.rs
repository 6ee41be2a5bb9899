use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Location, MatchStatus, Payment, Ride, UserRole};

/// Common wire envelope for every bus message. `id` doubles as the
/// at-least-once deduplication key (it is also sent as the `Nats-Msg-Id`
/// header) so redelivered messages are observationally idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub data: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            ts: Utc::now(),
            data,
        }
    }
}

/// Driver availability toggle. Lives only on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconEvent {
    pub user_id: Uuid,
    pub is_active: bool,
    pub location: Location,
}

/// Passenger ride request. Lives only on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinderEvent {
    pub user_id: Uuid,
    pub is_active: bool,
    pub location: Location,
    pub target_location: Location,
}

/// One side's answer to a proposal. `status` is the side's verdict, not
/// the proposal's resulting state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfirmRequest {
    pub match_id: Uuid,
    pub user_id: Uuid,
    pub role: UserRole,
    pub status: MatchConfirmVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfirmVerdict {
    Accepted,
    Rejected,
}

/// Per-second driver position report, forwarded by the gateway while a
/// ride is ongoing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdateEvent {
    pub user_id: Uuid,
    pub location: Location,
}

/// Roughly one of these per kilometer driven. The envelope id is the
/// ledger idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationAggregateEvent {
    pub ride_id: Uuid,
    pub distance_km: f64,
    pub cost: i64,
}

/// Asks the gateway to start a ride / report arrival / settle payment on
/// behalf of a connected client. Also the shape of the corresponding
/// service HTTP requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideStartRequest {
    pub ride_id: Uuid,
    pub driver_location: Location,
    pub passenger_location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProcessRequest {
    pub ride_id: Uuid,
    pub total_cost: i64,
    pub status: PaymentVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentVerdict {
    Accepted,
    Rejected,
}

/// `match.found`, `match.accepted` and `match.rejected` all carry the
/// proposal snapshot; consumers read the status field for the phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEvent {
    pub match_id: Uuid,
    pub driver_id: Uuid,
    pub passenger_id: Uuid,
    pub driver_location: Location,
    pub passenger_location: Location,
    pub target_location: Location,
    pub status: MatchStatus,
}

impl From<&crate::domain::MatchProposal> for MatchEvent {
    fn from(proposal: &crate::domain::MatchProposal) -> Self {
        Self {
            match_id: proposal.id,
            driver_id: proposal.driver_id,
            passenger_id: proposal.passenger_id,
            driver_location: proposal.driver_location,
            passenger_location: proposal.passenger_location,
            target_location: proposal.target_location,
            status: proposal.status,
        }
    }
}

/// `ride.pickup` and `ride.started` carry the ride row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideEvent {
    pub ride: Ride,
}

/// `ride.arrived` carries the payment request the passenger must settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideArrivedEvent {
    pub ride: Ride,
    pub payment_request: crate::domain::PaymentRequest,
}

/// `ride.completed` carries the settled ride and payment tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideCompletedEvent {
    pub ride: Ride,
    pub payment: Payment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_with_rfc3339_timestamp() {
        let event = EventEnvelope::new(BeaconEvent {
            user_id: Uuid::new_v4(),
            is_active: true,
            location: Location::new(-6.2, 106.8),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"id\""));
        assert!(json.contains("\"ts\""));
        let back: EventEnvelope<BeaconEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.data.user_id, event.data.user_id);
    }

    #[test]
    fn confirm_verdict_uses_lowercase_wire_names() {
        assert_eq!(
            serde_json::to_string(&MatchConfirmVerdict::Rejected).unwrap(),
            "\"rejected\""
        );
        let verdict: PaymentVerdict = serde_json::from_str("\"accepted\"").unwrap();
        assert_eq!(verdict, PaymentVerdict::Accepted);
    }
}
