use anyhow::Result;
use async_trait::async_trait;
use tumpang_core::domain::{Location, MatchProposal, MatchStatus, UserRole};
use tumpang_core::events::MatchEvent;
use uuid::Uuid;

/// A driver returned by a radius query, ascending-distance order.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyDriver {
    pub user_id: Uuid,
    pub distance_km: f64,
    pub latitude: f64,
    pub longitude: f64,
}

/// The two availability pools, one capability regardless of the backing
/// store's layout.
#[async_trait]
pub trait GeoPools: Send + Sync {
    async fn add(&self, role: UserRole, user_id: Uuid, location: &Location) -> Result<()>;
    async fn remove(&self, role: UserRole, user_id: Uuid) -> Result<()>;
    async fn nearby_drivers(&self, center: &Location, radius_km: f64)
        -> Result<Vec<NearbyDriver>>;
}

/// The active-ride index. `try_take` is the atomic check-and-set used by
/// the accepted transition; it returns false when the slot is occupied.
#[async_trait]
pub trait ActiveRides: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<Uuid>>;
    async fn try_take(&self, user_id: Uuid, ride_ref: Uuid) -> Result<bool>;
    async fn release(&self, user_id: Uuid) -> Result<()>;
}

/// Expected and next images of the CAS-guarded columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalImage {
    pub status: MatchStatus,
    pub driver_confirmed: bool,
    pub passenger_confirmed: bool,
}

impl ProposalImage {
    pub fn of(proposal: &MatchProposal) -> Self {
        Self {
            status: proposal.status,
            driver_confirmed: proposal.driver_confirmed,
            passenger_confirmed: proposal.passenger_confirmed,
        }
    }
}

#[async_trait]
pub trait MatchRepo: Send + Sync {
    async fn insert(&self, proposal: &MatchProposal) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<MatchProposal>>;
    /// Atomically move a proposal from `expected` to `next`. Returns the
    /// updated row, or None when another writer got there first.
    async fn compare_and_update(
        &self,
        id: Uuid,
        expected: ProposalImage,
        next: ProposalImage,
    ) -> Result<Option<MatchProposal>>;
    /// Open (pending or driver-confirmed) proposals for a passenger,
    /// excluding the one that just got accepted.
    async fn open_for_passenger(
        &self,
        passenger_id: Uuid,
        exclude: Uuid,
    ) -> Result<Vec<MatchProposal>>;
}

/// Outbound match events; backed by the bus in production.
#[async_trait]
pub trait MatchNotifier: Send + Sync {
    async fn match_found(&self, event: &MatchEvent) -> Result<()>;
    async fn match_accepted(&self, event: &MatchEvent) -> Result<()>;
    async fn match_rejected(&self, event: &MatchEvent) -> Result<()>;
}
