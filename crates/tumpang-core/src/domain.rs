use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of a match a user is on. Every role-dependent code path
/// dispatches on this instead of comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Driver,
    Passenger,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Driver => "driver",
            UserRole::Passenger => "passenger",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub msisdn: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A WGS84 point with the moment it was observed. Immutable value type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Observation time; defaults to receipt time when a client omits it.
    #[serde(default = "Utc::now")]
    pub ts: DateTime<Utc>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ts: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStatus {
    Pending,
    DriverConfirmed,
    PassengerConfirmed,
    Accepted,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::DriverConfirmed => "driver-confirmed",
            MatchStatus::PassengerConfirmed => "passenger-confirmed",
            MatchStatus::Accepted => "accepted",
            MatchStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(MatchStatus::Pending),
            "driver-confirmed" => Some(MatchStatus::DriverConfirmed),
            "passenger-confirmed" => Some(MatchStatus::PassengerConfirmed),
            "accepted" => Some(MatchStatus::Accepted),
            "rejected" => Some(MatchStatus::Rejected),
            _ => None,
        }
    }

    /// Accepted and rejected are terminal. Transitions are monotone along
    /// pending <= {driver-confirmed, passenger-confirmed} <= accepted, with
    /// rejected reachable from any non-accepted state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Accepted | MatchStatus::Rejected)
    }

    pub fn can_transition_to(&self, next: MatchStatus) -> bool {
        use MatchStatus::*;
        match (self, next) {
            (Pending, DriverConfirmed)
            | (Pending, PassengerConfirmed)
            | (Pending, Rejected)
            | (DriverConfirmed, Accepted)
            | (DriverConfirmed, Rejected)
            | (PassengerConfirmed, Accepted)
            | (PassengerConfirmed, Rejected) => true,
            _ => false,
        }
    }
}

/// A proposed pairing of one driver and one passenger, awaiting
/// confirmation from both sides. Location fields are snapshots taken at
/// proposal time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProposal {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub passenger_id: Uuid,
    pub driver_location: Location,
    pub passenger_location: Location,
    pub target_location: Location,
    pub status: MatchStatus,
    pub driver_confirmed: bool,
    pub passenger_confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchProposal {
    pub fn participant_role(&self, user_id: Uuid) -> Option<UserRole> {
        if user_id == self.driver_id {
            Some(UserRole::Driver)
        } else if user_id == self.passenger_id {
            Some(UserRole::Passenger)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RideStatus {
    DriverPickup,
    Ongoing,
    Arrived,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::DriverPickup => "driver-pickup",
            RideStatus::Ongoing => "ongoing",
            RideStatus::Arrived => "arrived",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "driver-pickup" => Some(RideStatus::DriverPickup),
            "ongoing" => Some(RideStatus::Ongoing),
            "arrived" => Some(RideStatus::Arrived),
            "completed" => Some(RideStatus::Completed),
            "cancelled" => Some(RideStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }
}

/// Total cost is an accumulator over ledger entries, in integer IDR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub match_id: Uuid,
    pub driver_id: Uuid,
    pub passenger_id: Uuid,
    pub status: RideStatus,
    pub total_cost: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One per-segment billing record. Append-only; the sum over a ride equals
/// the ride's total cost once the ride has arrived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEntry {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub distance_km: f64,
    pub cost: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Accepted,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Accepted => "accepted",
            PaymentStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "accepted" => Some(PaymentStatus::Accepted),
            "rejected" => Some(PaymentStatus::Rejected),
            _ => None,
        }
    }
}

/// Created exactly once when a ride arrives. All amounts in integer IDR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub adjusted_cost: i64,
    pub admin_fee: i64,
    pub driver_payout: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Handed to the passenger after arrival; the QR is reached outside this
/// system, payment comes back as a status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub amount: i64,
    pub qr_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_status_serializes_kebab_case() {
        let json = serde_json::to_string(&MatchStatus::DriverConfirmed).unwrap();
        assert_eq!(json, "\"driver-confirmed\"");
        let back: MatchStatus = serde_json::from_str("\"passenger-confirmed\"").unwrap();
        assert_eq!(back, MatchStatus::PassengerConfirmed);
    }

    #[test]
    fn match_status_transitions_are_monotone() {
        use MatchStatus::*;
        assert!(Pending.can_transition_to(DriverConfirmed));
        assert!(Pending.can_transition_to(PassengerConfirmed));
        assert!(DriverConfirmed.can_transition_to(Accepted));
        assert!(PassengerConfirmed.can_transition_to(Accepted));
        for from in [Pending, DriverConfirmed, PassengerConfirmed] {
            assert!(from.can_transition_to(Rejected));
        }
        // Accepted never reverts, rejected is a sink.
        for next in [Pending, DriverConfirmed, PassengerConfirmed, Accepted, Rejected] {
            assert!(!Accepted.can_transition_to(next));
            assert!(!Rejected.can_transition_to(next));
        }
        assert!(!Pending.can_transition_to(Accepted));
    }

    #[test]
    fn ride_status_round_trips_as_str() {
        for status in [
            RideStatus::DriverPickup,
            RideStatus::Ongoing,
            RideStatus::Arrived,
            RideStatus::Completed,
            RideStatus::Cancelled,
        ] {
            assert_eq!(RideStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RideStatus::parse("parked"), None);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&UserRole::Driver).unwrap(), "\"driver\"");
        let role: UserRole = serde_json::from_str("\"passenger\"").unwrap();
        assert_eq!(role, UserRole::Passenger);
    }
}
