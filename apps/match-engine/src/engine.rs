use crate::error::MatchError;
use crate::ports::{ActiveRides, GeoPools, MatchNotifier, MatchRepo, ProposalImage};
use chrono::Utc;
use std::sync::Arc;
use tumpang_core::domain::{Location, MatchProposal, MatchStatus, UserRole};
use tumpang_core::events::{
    BeaconEvent, FinderEvent, MatchConfirmRequest, MatchConfirmVerdict, MatchEvent,
};
use uuid::Uuid;

const CONFIRM_RETRIES: usize = 5;

pub struct MatchEngine {
    pools: Arc<dyn GeoPools>,
    active_rides: Arc<dyn ActiveRides>,
    repo: Arc<dyn MatchRepo>,
    notifier: Arc<dyn MatchNotifier>,
    search_radius_km: f64,
}

impl MatchEngine {
    pub fn new(
        pools: Arc<dyn GeoPools>,
        active_rides: Arc<dyn ActiveRides>,
        repo: Arc<dyn MatchRepo>,
        notifier: Arc<dyn MatchNotifier>,
        search_radius_km: f64,
    ) -> Self {
        Self {
            pools,
            active_rides,
            repo,
            notifier,
            search_radius_km,
        }
    }

    /// Pool admission is guarded by the active-ride index but fails open:
    /// a store outage must not lock reconnecting drivers out of work.
    async fn has_active_ride(&self, user_id: Uuid) -> bool {
        match self.active_rides.get(user_id).await {
            Ok(found) => found.is_some(),
            Err(err) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = format!("{err:#}"),
                    "active ride lookup failed; admitting to pool"
                );
                false
            }
        }
    }

    pub async fn handle_beacon(&self, event: BeaconEvent) -> anyhow::Result<()> {
        if !event.is_active {
            self.pools.remove(UserRole::Driver, event.user_id).await?;
            tracing::info!(driver_id = %event.user_id, "driver left the pool");
            return Ok(());
        }

        if self.has_active_ride(event.user_id).await {
            tracing::info!(driver_id = %event.user_id, "driver has an active ride; not pooled");
            return Ok(());
        }

        self.pools
            .add(UserRole::Driver, event.user_id, &event.location)
            .await?;
        tracing::info!(driver_id = %event.user_id, "driver joined the pool");
        Ok(())
    }

    /// Proposal ids are derived from the finder's envelope id, so a
    /// redelivered finder recreates the same proposals instead of minting
    /// a second batch.
    pub async fn handle_finder(&self, event_id: Uuid, event: FinderEvent) -> anyhow::Result<()> {
        if !event.is_active {
            self.pools
                .remove(UserRole::Passenger, event.user_id)
                .await?;
            return Ok(());
        }

        if self.has_active_ride(event.user_id).await {
            tracing::info!(passenger_id = %event.user_id, "passenger has an active ride; not pooled");
            return Ok(());
        }

        self.pools
            .add(UserRole::Passenger, event.user_id, &event.location)
            .await?;

        let nearby = self
            .pools
            .nearby_drivers(&event.location, self.search_radius_km)
            .await?;
        tracing::info!(
            passenger_id = %event.user_id,
            drivers = nearby.len(),
            radius_km = self.search_radius_km,
            "finder searched the driver pool"
        );

        // One proposal per nearby driver, published in ascending-distance
        // order; the drivers choose, the engine does not rank further.
        let now = Utc::now();
        for driver in nearby {
            let proposal = MatchProposal {
                id: proposal_id(event_id, driver.user_id),
                driver_id: driver.user_id,
                passenger_id: event.user_id,
                driver_location: Location {
                    latitude: driver.latitude,
                    longitude: driver.longitude,
                    ts: now,
                },
                passenger_location: event.location,
                target_location: event.target_location,
                status: MatchStatus::Pending,
                driver_confirmed: false,
                passenger_confirmed: false,
                created_at: now,
                updated_at: now,
            };
            if let Err(err) = self.repo.insert(&proposal).await {
                tracing::warn!(
                    driver_id = %driver.user_id,
                    error = format!("{err:#}"),
                    "failed to persist proposal; skipping driver"
                );
                continue;
            }
            if let Err(err) = self.notifier.match_found(&MatchEvent::from(&proposal)).await {
                tracing::warn!(
                    match_id = %proposal.id,
                    error = format!("{err:#}"),
                    "failed to publish match.found"
                );
            }
        }
        Ok(())
    }

    /// Record one side's confirmation or rejection. The read-modify-write
    /// is a CAS against (status, flags); concurrent confirms for the same
    /// proposal retry against the fresh row.
    pub async fn confirm(&self, request: MatchConfirmRequest) -> Result<MatchProposal, MatchError> {
        for _ in 0..CONFIRM_RETRIES {
            let proposal = self
                .repo
                .get(request.match_id)
                .await
                .map_err(MatchError::Store)?
                .ok_or(MatchError::NotFound)?;

            let side = proposal
                .participant_role(request.user_id)
                .ok_or(MatchError::NotParticipant)?;
            if side != request.role {
                return Err(MatchError::RoleMismatch);
            }
            if proposal.status.is_terminal() {
                return Err(MatchError::InvalidState(proposal.status));
            }

            let expected = ProposalImage::of(&proposal);
            let next = match request.status {
                MatchConfirmVerdict::Rejected => ProposalImage {
                    status: MatchStatus::Rejected,
                    ..expected
                },
                MatchConfirmVerdict::Accepted => {
                    confirm_image(expected, side).ok_or(MatchError::InvalidState(proposal.status))?
                }
            };

            if next.status == MatchStatus::Accepted {
                match self.accept(&proposal, expected, next).await? {
                    Some(updated) => return Ok(updated),
                    None => continue,
                }
            }

            let updated = self
                .repo
                .compare_and_update(proposal.id, expected, next)
                .await
                .map_err(MatchError::Store)?;
            let Some(updated) = updated else {
                continue;
            };

            if updated.status == MatchStatus::Rejected {
                if let Err(err) = self
                    .notifier
                    .match_rejected(&MatchEvent::from(&updated))
                    .await
                {
                    tracing::warn!(match_id = %updated.id, error = format!("{err:#}"), "failed to publish match.rejected");
                }
            }
            return Ok(updated);
        }

        Err(MatchError::Conflict)
    }

    /// The accepted transition: check-and-take both active-ride slots,
    /// then CAS the proposal. Returns Ok(None) when the CAS lost and the
    /// caller should retry from a fresh read.
    async fn accept(
        &self,
        proposal: &MatchProposal,
        expected: ProposalImage,
        next: ProposalImage,
    ) -> Result<Option<MatchProposal>, MatchError> {
        if !self
            .active_rides
            .try_take(proposal.driver_id, proposal.id)
            .await
            .map_err(MatchError::Store)?
        {
            return Err(MatchError::ActiveRideExists);
        }
        if !self
            .active_rides
            .try_take(proposal.passenger_id, proposal.id)
            .await
            .map_err(MatchError::Store)?
        {
            self.release_slot(proposal.driver_id).await;
            return Err(MatchError::ActiveRideExists);
        }

        let updated = self
            .repo
            .compare_and_update(proposal.id, expected, next)
            .await
            .map_err(MatchError::Store)?;
        let Some(updated) = updated else {
            self.release_slot(proposal.driver_id).await;
            self.release_slot(proposal.passenger_id).await;
            return Ok(None);
        };

        for (role, user_id) in [
            (UserRole::Driver, updated.driver_id),
            (UserRole::Passenger, updated.passenger_id),
        ] {
            if let Err(err) = self.pools.remove(role, user_id).await {
                tracing::warn!(user_id = %user_id, error = format!("{err:#}"), "failed to clear pool entry");
            }
        }

        if let Err(err) = self
            .notifier
            .match_accepted(&MatchEvent::from(&updated))
            .await
        {
            tracing::error!(match_id = %updated.id, error = format!("{err:#}"), "failed to publish match.accepted");
        }

        let repo = self.repo.clone();
        let notifier = self.notifier.clone();
        let accepted_id = updated.id;
        let passenger_id = updated.passenger_id;
        tokio::spawn(async move {
            auto_reject_siblings(repo, notifier, passenger_id, accepted_id).await;
        });

        tracing::info!(match_id = %updated.id, "match accepted");
        Ok(Some(updated))
    }

    async fn release_slot(&self, user_id: Uuid) {
        if let Err(err) = self.active_rides.release(user_id).await {
            tracing::warn!(user_id = %user_id, error = format!("{err:#}"), "failed to release active-ride slot");
        }
    }
}

/// Reject the passenger's other open proposals after an acceptance. Runs
/// detached from the confirm call; every failure is logged and the next
/// redelivery or sibling confirm converges the state.
pub(crate) async fn auto_reject_siblings(
    repo: Arc<dyn MatchRepo>,
    notifier: Arc<dyn MatchNotifier>,
    passenger_id: Uuid,
    accepted_id: Uuid,
) {
    let siblings = match repo.open_for_passenger(passenger_id, accepted_id).await {
        Ok(siblings) => siblings,
        Err(err) => {
            tracing::warn!(
                passenger_id = %passenger_id,
                error = format!("{err:#}"),
                "failed to enumerate sibling proposals"
            );
            return;
        }
    };

    for sibling in siblings {
        let expected = ProposalImage::of(&sibling);
        if expected.status.is_terminal() {
            continue;
        }
        let next = ProposalImage {
            status: MatchStatus::Rejected,
            ..expected
        };
        match repo.compare_and_update(sibling.id, expected, next).await {
            Ok(Some(rejected)) => {
                if let Err(err) = notifier.match_rejected(&MatchEvent::from(&rejected)).await {
                    tracing::warn!(match_id = %rejected.id, error = format!("{err:#}"), "failed to publish sibling rejection");
                }
            }
            Ok(None) => {
                tracing::debug!(match_id = %sibling.id, "sibling changed concurrently; leaving as-is");
            }
            Err(err) => {
                tracing::warn!(match_id = %sibling.id, error = format!("{err:#}"), "failed to reject sibling");
            }
        }
    }
}

fn proposal_id(finder_event_id: Uuid, driver_id: Uuid) -> Uuid {
    let name = format!("finder:{finder_event_id}:driver:{driver_id}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// Next CAS image for an acceptance from the given side, or None when the
/// side has already confirmed (re-acceptance is not a listed transition).
fn confirm_image(current: ProposalImage, side: UserRole) -> Option<ProposalImage> {
    match (side, current.status) {
        (UserRole::Driver, MatchStatus::Pending) => Some(ProposalImage {
            status: MatchStatus::DriverConfirmed,
            driver_confirmed: true,
            ..current
        }),
        (UserRole::Driver, MatchStatus::PassengerConfirmed) => Some(ProposalImage {
            status: MatchStatus::Accepted,
            driver_confirmed: true,
            ..current
        }),
        (UserRole::Passenger, MatchStatus::Pending) => Some(ProposalImage {
            status: MatchStatus::PassengerConfirmed,
            passenger_confirmed: true,
            ..current
        }),
        (UserRole::Passenger, MatchStatus::DriverConfirmed) => Some(ProposalImage {
            status: MatchStatus::Accepted,
            passenger_confirmed: true,
            ..current
        }),
        _ => None,
    }
}
