use crate::error::RideError;
use crate::ports::{ActiveRideIndex, CreateOutcome, RideNotifier, RideRepo};
use chrono::Utc;
use std::sync::Arc;
use tumpang_core::domain::{
    BillingEntry, Payment, PaymentRequest, PaymentStatus, Ride, RideStatus,
};
use tumpang_core::events::{
    LocationAggregateEvent, MatchEvent, PaymentProcessRequest, PaymentVerdict, RideStartRequest,
};
use tumpang_core::geo::haversine_m;
use uuid::Uuid;

/// Drivers must be this close to the passenger before a ride may start.
const START_PROXIMITY_M: f64 = 100.0;

/// Out-of-range adjustment factors are reset to 1 (no adjustment), not
/// clamped to the nearest bound.
pub fn clamp_adjustment(factor: f64) -> f64 {
    if (0.0..=1.0).contains(&factor) {
        factor
    } else {
        1.0
    }
}

/// (adjusted cost, admin fee, driver payout), all integer IDR.
pub fn compute_payment(ledger_sum: i64, factor: f64, admin_fee_percent: f64) -> (i64, i64, i64) {
    let adjusted = (ledger_sum as f64 * clamp_adjustment(factor)).round() as i64;
    let admin_fee = (adjusted as f64 * admin_fee_percent / 100.0).round() as i64;
    (adjusted, admin_fee, adjusted - admin_fee)
}

pub struct RideLifecycle {
    repo: Arc<dyn RideRepo>,
    active_rides: Arc<dyn ActiveRideIndex>,
    notifier: Arc<dyn RideNotifier>,
    admin_fee_percent: f64,
    qr_base_url: String,
}

impl RideLifecycle {
    pub fn new(
        repo: Arc<dyn RideRepo>,
        active_rides: Arc<dyn ActiveRideIndex>,
        notifier: Arc<dyn RideNotifier>,
        admin_fee_percent: f64,
        qr_base_url: String,
    ) -> Self {
        Self {
            repo,
            active_rides,
            notifier,
            admin_fee_percent,
            qr_base_url,
        }
    }

    /// Create the ride for an accepted match. Idempotent by match id:
    /// redeliveries find the existing row, re-assign the (overwriting)
    /// index entries, and re-publish the deduplicated pickup event.
    pub async fn create_ride(&self, event: &MatchEvent) -> Result<Ride, RideError> {
        let now = Utc::now();
        let candidate = Ride {
            id: Uuid::new_v4(),
            match_id: event.match_id,
            driver_id: event.driver_id,
            passenger_id: event.passenger_id,
            status: RideStatus::DriverPickup,
            total_cost: 0,
            created_at: now,
            updated_at: now,
        };

        let outcome = self.repo.create(&candidate).await?;
        let ride = outcome.ride().clone();
        if matches!(outcome, CreateOutcome::Existing(_)) {
            tracing::info!(match_id = %event.match_id, ride_id = %ride.id, "ride already exists for match");
        } else {
            tracing::info!(match_id = %event.match_id, ride_id = %ride.id, "ride created");
        }

        self.active_rides.assign(ride.driver_id, ride.id).await?;
        self.active_rides.assign(ride.passenger_id, ride.id).await?;
        self.notifier.ride_pickup(&ride).await?;
        Ok(ride)
    }

    /// Move driver-pickup -> ongoing once the driver is within 100 m of
    /// the passenger.
    pub async fn start_ride(&self, request: RideStartRequest) -> Result<Ride, RideError> {
        let ride = self
            .repo
            .get(request.ride_id)
            .await?
            .ok_or(RideError::NotFound)?;
        if ride.status != RideStatus::DriverPickup {
            return Err(RideError::InvalidState(ride.status));
        }

        let distance_m = haversine_m(&request.driver_location, &request.passenger_location);
        if distance_m > START_PROXIMITY_M {
            return Err(RideError::TooFar { distance_m });
        }

        let updated = self
            .repo
            .update_status(ride.id, RideStatus::DriverPickup, RideStatus::Ongoing)
            .await?;
        let Some(updated) = updated else {
            let current = self
                .repo
                .get(ride.id)
                .await?
                .ok_or(RideError::NotFound)?;
            return Err(RideError::InvalidState(current.status));
        };

        if let Err(err) = self.notifier.ride_started(&updated).await {
            tracing::warn!(ride_id = %updated.id, error = format!("{err:#}"), "failed to publish ride.started");
        }
        tracing::info!(ride_id = %updated.id, "ride started");
        Ok(updated)
    }

    /// Append one per-km aggregate to the ledger. The entry id is the
    /// aggregate's envelope id; duplicates are ignored.
    pub async fn process_billing(
        &self,
        entry_id: Uuid,
        aggregate: &LocationAggregateEvent,
    ) -> anyhow::Result<()> {
        let ride = self
            .repo
            .get(aggregate.ride_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("ride {} not found for aggregate", aggregate.ride_id))?;
        if ride.status != RideStatus::Ongoing {
            tracing::warn!(
                ride_id = %ride.id,
                status = ride.status.as_str(),
                "billing aggregate for a ride that is not ongoing; dropping"
            );
            return Ok(());
        }

        let entry = BillingEntry {
            id: entry_id,
            ride_id: aggregate.ride_id,
            distance_km: aggregate.distance_km,
            cost: aggregate.cost,
            created_at: Utc::now(),
        };
        if self.repo.append_billing(&entry).await? {
            tracing::info!(ride_id = %ride.id, cost = entry.cost, "billing entry appended");
        } else {
            tracing::debug!(entry_id = %entry_id, "duplicate billing entry ignored");
        }
        Ok(())
    }

    /// Sum the ledger into a pending payment and hand back the QR the
    /// passenger settles out-of-band. The ride stays ongoing until the
    /// payment is processed.
    pub async fn ride_arrived(
        &self,
        ride_id: Uuid,
        adjustment_factor: f64,
    ) -> Result<PaymentRequest, RideError> {
        let ride = self.repo.get(ride_id).await?.ok_or(RideError::NotFound)?;
        if ride.status != RideStatus::Ongoing {
            return Err(RideError::InvalidState(ride.status));
        }

        if let Some(existing) = self.repo.get_payment(ride_id).await? {
            return Ok(self.payment_request(&ride, &existing));
        }

        let ledger_sum = self.repo.sum_ledger(ride_id).await?;
        let (adjusted_cost, admin_fee, driver_payout) =
            compute_payment(ledger_sum, adjustment_factor, self.admin_fee_percent);

        let payment = Payment {
            id: Uuid::new_v4(),
            ride_id,
            adjusted_cost,
            admin_fee,
            driver_payout,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        };
        let stored = self.repo.insert_payment(&payment).await?;
        let request = self.payment_request(&ride, &stored);

        if let Err(err) = self.notifier.ride_arrived(&ride, &request).await {
            tracing::warn!(ride_id = %ride.id, error = format!("{err:#}"), "failed to publish ride.arrived");
        }
        tracing::info!(
            ride_id = %ride.id,
            adjusted = adjusted_cost,
            admin_fee,
            payout = driver_payout,
            "ride arrived; payment pending"
        );
        Ok(request)
    }

    /// Settle the pending payment. Acceptance completes the ride and
    /// clears the active-ride index; rejection leaves the ride ongoing so
    /// a later attempt can still succeed.
    pub async fn process_payment(
        &self,
        request: PaymentProcessRequest,
    ) -> Result<(Ride, Payment), RideError> {
        let ride = self
            .repo
            .get(request.ride_id)
            .await?
            .ok_or(RideError::NotFound)?;
        let payment = self
            .repo
            .get_payment(request.ride_id)
            .await?
            .ok_or(RideError::PaymentNotFound)?;

        if request.total_cost != payment.adjusted_cost {
            return Err(RideError::PaymentMismatch);
        }

        // An already-accepted payment means a previous attempt stopped
        // partway; finish the completion steps instead of failing, so
        // retries converge.
        if payment.status == PaymentStatus::Accepted {
            let ride = self.complete(ride, &payment).await?;
            return Ok((ride, payment));
        }

        if ride.status != RideStatus::Ongoing {
            return Err(RideError::InvalidState(ride.status));
        }

        let target = match request.status {
            PaymentVerdict::Accepted => PaymentStatus::Accepted,
            PaymentVerdict::Rejected => PaymentStatus::Rejected,
        };
        let settled = self
            .repo
            .settle_payment(request.ride_id, target)
            .await?
            .ok_or(RideError::InvalidState(ride.status))?;

        match settled.status {
            PaymentStatus::Accepted => {
                let completed = self.complete(ride, &settled).await?;
                Ok((completed, settled))
            }
            _ => {
                tracing::info!(ride_id = %ride.id, "payment rejected; ride stays ongoing");
                Ok((ride, settled))
            }
        }
    }

    async fn complete(&self, ride: Ride, payment: &Payment) -> Result<Ride, RideError> {
        let completed = match self
            .repo
            .update_status(ride.id, RideStatus::Ongoing, RideStatus::Completed)
            .await?
        {
            Some(updated) => updated,
            // Already completed by an earlier attempt.
            None => self.repo.get(ride.id).await?.ok_or(RideError::NotFound)?,
        };

        for user_id in [completed.driver_id, completed.passenger_id] {
            if let Err(err) = self.active_rides.clear(user_id).await {
                tracing::warn!(user_id = %user_id, error = format!("{err:#}"), "failed to clear active-ride entry");
            }
        }

        self.notifier.ride_completed(&completed, payment).await?;
        tracing::info!(ride_id = %completed.id, "ride completed");
        Ok(completed)
    }

    /// Abort a ride that has not completed. No bus subject exists for
    /// cancellations; the index entries are simply released.
    pub async fn cancel_ride(&self, ride_id: Uuid) -> Result<Ride, RideError> {
        let ride = self.repo.get(ride_id).await?.ok_or(RideError::NotFound)?;
        if !matches!(ride.status, RideStatus::DriverPickup | RideStatus::Ongoing) {
            return Err(RideError::InvalidState(ride.status));
        }

        let updated = self
            .repo
            .update_status(ride.id, ride.status, RideStatus::Cancelled)
            .await?;
        let Some(updated) = updated else {
            let current = self.repo.get(ride.id).await?.ok_or(RideError::NotFound)?;
            return Err(RideError::InvalidState(current.status));
        };

        for user_id in [updated.driver_id, updated.passenger_id] {
            if let Err(err) = self.active_rides.clear(user_id).await {
                tracing::warn!(user_id = %user_id, error = format!("{err:#}"), "failed to clear active-ride entry");
            }
        }
        tracing::info!(ride_id = %updated.id, "ride cancelled");
        Ok(updated)
    }

    fn payment_request(&self, ride: &Ride, payment: &Payment) -> PaymentRequest {
        PaymentRequest {
            ride_id: ride.id,
            passenger_id: ride.passenger_id,
            amount: payment.adjusted_cost,
            qr_url: format!(
                "{}?ride_id={}&amount={}&user_id={}",
                self.qr_base_url, ride.id, payment.adjusted_cost, ride.passenger_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tumpang_core::domain::{Location, MatchStatus};

    #[derive(Default)]
    struct MemRepoInner {
        rides: HashMap<Uuid, Ride>,
        by_match: HashMap<Uuid, Uuid>,
        entries: HashMap<Uuid, BillingEntry>,
        payments: HashMap<Uuid, Payment>,
    }

    #[derive(Default)]
    struct MemRepo {
        inner: Mutex<MemRepoInner>,
    }

    #[async_trait]
    impl RideRepo for MemRepo {
        async fn create(&self, ride: &Ride) -> Result<CreateOutcome> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(existing_id) = inner.by_match.get(&ride.match_id) {
                let existing = inner.rides[existing_id].clone();
                return Ok(CreateOutcome::Existing(existing));
            }
            inner.by_match.insert(ride.match_id, ride.id);
            inner.rides.insert(ride.id, ride.clone());
            Ok(CreateOutcome::Inserted(ride.clone()))
        }

        async fn get(&self, id: Uuid) -> Result<Option<Ride>> {
            Ok(self.inner.lock().unwrap().rides.get(&id).cloned())
        }

        async fn update_status(
            &self,
            id: Uuid,
            from: RideStatus,
            to: RideStatus,
        ) -> Result<Option<Ride>> {
            let mut inner = self.inner.lock().unwrap();
            let Some(ride) = inner.rides.get_mut(&id) else {
                return Ok(None);
            };
            if ride.status != from {
                return Ok(None);
            }
            ride.status = to;
            ride.updated_at = Utc::now();
            Ok(Some(ride.clone()))
        }

        async fn append_billing(&self, entry: &BillingEntry) -> Result<bool> {
            let mut inner = self.inner.lock().unwrap();
            if inner.entries.contains_key(&entry.id) {
                return Ok(false);
            }
            inner.entries.insert(entry.id, entry.clone());
            if let Some(ride) = inner.rides.get_mut(&entry.ride_id) {
                ride.total_cost += entry.cost;
            }
            Ok(true)
        }

        async fn sum_ledger(&self, ride_id: Uuid) -> Result<i64> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .entries
                .values()
                .filter(|entry| entry.ride_id == ride_id)
                .map(|entry| entry.cost)
                .sum())
        }

        async fn insert_payment(&self, payment: &Payment) -> Result<Payment> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(existing) = inner.payments.get(&payment.ride_id) {
                return Ok(existing.clone());
            }
            inner.payments.insert(payment.ride_id, payment.clone());
            Ok(payment.clone())
        }

        async fn get_payment(&self, ride_id: Uuid) -> Result<Option<Payment>> {
            Ok(self.inner.lock().unwrap().payments.get(&ride_id).cloned())
        }

        async fn settle_payment(
            &self,
            ride_id: Uuid,
            to: PaymentStatus,
        ) -> Result<Option<Payment>> {
            let mut inner = self.inner.lock().unwrap();
            let Some(payment) = inner.payments.get_mut(&ride_id) else {
                return Ok(None);
            };
            if payment.status == PaymentStatus::Accepted {
                return Ok(None);
            }
            payment.status = to;
            Ok(Some(payment.clone()))
        }
    }

    #[derive(Default)]
    struct MemIndex {
        slots: Mutex<HashMap<Uuid, Uuid>>,
    }

    #[async_trait]
    impl ActiveRideIndex for MemIndex {
        async fn assign(&self, user_id: Uuid, ride_id: Uuid) -> Result<()> {
            self.slots.lock().unwrap().insert(user_id, ride_id);
            Ok(())
        }

        async fn clear(&self, user_id: Uuid) -> Result<()> {
            self.slots.lock().unwrap().remove(&user_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        published: Mutex<Vec<(&'static str, Uuid)>>,
    }

    impl RecordingNotifier {
        fn count(&self, kind: &str) -> usize {
            self.published
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| *k == kind)
                .count()
        }
    }

    #[async_trait]
    impl RideNotifier for RecordingNotifier {
        async fn ride_pickup(&self, ride: &Ride) -> Result<()> {
            self.published.lock().unwrap().push(("pickup", ride.id));
            Ok(())
        }

        async fn ride_started(&self, ride: &Ride) -> Result<()> {
            self.published.lock().unwrap().push(("started", ride.id));
            Ok(())
        }

        async fn ride_arrived(&self, ride: &Ride, _request: &PaymentRequest) -> Result<()> {
            self.published.lock().unwrap().push(("arrived", ride.id));
            Ok(())
        }

        async fn ride_completed(&self, ride: &Ride, _payment: &Payment) -> Result<()> {
            self.published.lock().unwrap().push(("completed", ride.id));
            Ok(())
        }
    }

    struct Fixture {
        lifecycle: RideLifecycle,
        repo: Arc<MemRepo>,
        index: Arc<MemIndex>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemRepo::default());
        let index = Arc::new(MemIndex::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let lifecycle = RideLifecycle::new(
            repo.clone(),
            index.clone(),
            notifier.clone(),
            5.0,
            "https://pay.example.test/qr".to_string(),
        );
        Fixture {
            lifecycle,
            repo,
            index,
            notifier,
        }
    }

    fn accepted_match() -> MatchEvent {
        MatchEvent {
            match_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            driver_location: Location::new(-6.2000, 106.8400),
            passenger_location: Location::new(-6.2088, 106.8456),
            target_location: Location::new(-6.1751, 106.8650),
            status: MatchStatus::Accepted,
        }
    }

    async fn ongoing_ride(fx: &Fixture) -> Ride {
        let ride = fx.lifecycle.create_ride(&accepted_match()).await.unwrap();
        fx.lifecycle
            .start_ride(RideStartRequest {
                ride_id: ride.id,
                driver_location: Location::new(-6.2088, 106.8456),
                passenger_location: Location::new(-6.2088, 106.8456),
            })
            .await
            .unwrap()
    }

    async fn bill(fx: &Fixture, ride_id: Uuid, cost: i64) {
        fx.lifecycle
            .process_billing(
                Uuid::new_v4(),
                &LocationAggregateEvent {
                    ride_id,
                    distance_km: 1.0,
                    cost,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_match_accepted_creates_one_ride() {
        let fx = fixture();
        let event = accepted_match();

        let first = fx.lifecycle.create_ride(&event).await.unwrap();
        let second = fx.lifecycle.create_ride(&event).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(fx.repo.inner.lock().unwrap().rides.len(), 1);
        let slots = fx.index.slots.lock().unwrap();
        assert_eq!(slots.get(&event.driver_id), Some(&first.id));
        assert_eq!(slots.get(&event.passenger_id), Some(&first.id));
    }

    #[tokio::test]
    async fn start_requires_driver_proximity() {
        let fx = fixture();
        let ride = fx.lifecycle.create_ride(&accepted_match()).await.unwrap();

        // Roughly 4.5 km apart.
        let err = fx
            .lifecycle
            .start_ride(RideStartRequest {
                ride_id: ride.id,
                driver_location: Location::new(-6.1750, 106.8650),
                passenger_location: Location::new(-6.2088, 106.8456),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RideError::TooFar { distance_m } if distance_m > 4000.0));

        let row = fx.repo.get(ride.id).await.unwrap().unwrap();
        assert_eq!(row.status, RideStatus::DriverPickup);
    }

    #[tokio::test]
    async fn start_within_proximity_moves_to_ongoing() {
        let fx = fixture();
        let ride = ongoing_ride(&fx).await;
        assert_eq!(ride.status, RideStatus::Ongoing);
        assert_eq!(fx.notifier.count("started"), 1);

        // A second start is a state error.
        let err = fx
            .lifecycle
            .start_ride(RideStartRequest {
                ride_id: ride.id,
                driver_location: Location::new(-6.2088, 106.8456),
                passenger_location: Location::new(-6.2088, 106.8456),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RideError::InvalidState(RideStatus::Ongoing)));
    }

    #[tokio::test]
    async fn billing_accumulates_and_ignores_duplicates() {
        let fx = fixture();
        let ride = ongoing_ride(&fx).await;

        let duplicate = Uuid::new_v4();
        let aggregate = LocationAggregateEvent {
            ride_id: ride.id,
            distance_km: 1.0,
            cost: 3000,
        };
        fx.lifecycle
            .process_billing(duplicate, &aggregate)
            .await
            .unwrap();
        fx.lifecycle
            .process_billing(duplicate, &aggregate)
            .await
            .unwrap();
        bill(&fx, ride.id, 3000).await;

        let row = fx.repo.get(ride.id).await.unwrap().unwrap();
        assert_eq!(row.total_cost, 6000);
        assert_eq!(fx.repo.inner.lock().unwrap().entries.len(), 2);
    }

    #[tokio::test]
    async fn billing_for_a_pickup_ride_is_dropped() {
        let fx = fixture();
        let ride = fx.lifecycle.create_ride(&accepted_match()).await.unwrap();
        bill(&fx, ride.id, 3000).await;
        let row = fx.repo.get(ride.id).await.unwrap().unwrap();
        assert_eq!(row.total_cost, 0);
    }

    #[tokio::test]
    async fn arrival_computes_adjusted_fare_and_fees() {
        let fx = fixture();
        let ride = ongoing_ride(&fx).await;
        for _ in 0..3 {
            bill(&fx, ride.id, 3000).await;
        }

        let request = fx.lifecycle.ride_arrived(ride.id, 0.8).await.unwrap();
        assert_eq!(request.amount, 7200);
        assert_eq!(request.passenger_id, ride.passenger_id);
        assert!(request.qr_url.contains(&ride.id.to_string()));
        assert!(request.qr_url.contains("amount=7200"));

        let payment = fx.repo.get_payment(ride.id).await.unwrap().unwrap();
        assert_eq!(payment.adjusted_cost, 7200);
        assert_eq!(payment.admin_fee, 360);
        assert_eq!(payment.driver_payout, 6840);
        assert_eq!(payment.status, PaymentStatus::Pending);

        // The ride stays ongoing until the payment is processed.
        let row = fx.repo.get(ride.id).await.unwrap().unwrap();
        assert_eq!(row.status, RideStatus::Ongoing);
        assert_eq!(fx.notifier.count("arrived"), 1);
    }

    #[tokio::test]
    async fn out_of_range_adjustment_factor_is_reset_to_one() {
        let fx = fixture();
        let ride = ongoing_ride(&fx).await;
        bill(&fx, ride.id, 9000).await;

        let request = fx.lifecycle.ride_arrived(ride.id, 1.7).await.unwrap();
        assert_eq!(request.amount, 9000);
    }

    #[tokio::test]
    async fn second_arrival_returns_the_stored_payment() {
        let fx = fixture();
        let ride = ongoing_ride(&fx).await;
        bill(&fx, ride.id, 9000).await;

        let first = fx.lifecycle.ride_arrived(ride.id, 0.8).await.unwrap();
        let second = fx.lifecycle.ride_arrived(ride.id, 0.5).await.unwrap();
        assert_eq!(first.amount, 7200);
        assert_eq!(second.amount, 7200);
    }

    #[tokio::test]
    async fn payment_mismatch_leaves_everything_pending() {
        let fx = fixture();
        let ride = ongoing_ride(&fx).await;
        for _ in 0..3 {
            bill(&fx, ride.id, 3000).await;
        }
        fx.lifecycle.ride_arrived(ride.id, 0.8).await.unwrap();

        let err = fx
            .lifecycle
            .process_payment(PaymentProcessRequest {
                ride_id: ride.id,
                total_cost: 7000,
                status: PaymentVerdict::Accepted,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RideError::PaymentMismatch));

        let payment = fx.repo.get_payment(ride.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        let row = fx.repo.get(ride.id).await.unwrap().unwrap();
        assert_eq!(row.status, RideStatus::Ongoing);
    }

    #[tokio::test]
    async fn accepted_payment_completes_the_ride() {
        let fx = fixture();
        let ride = ongoing_ride(&fx).await;
        for _ in 0..3 {
            bill(&fx, ride.id, 3000).await;
        }
        fx.lifecycle.ride_arrived(ride.id, 0.8).await.unwrap();

        let (completed, payment) = fx
            .lifecycle
            .process_payment(PaymentProcessRequest {
                ride_id: ride.id,
                total_cost: 7200,
                status: PaymentVerdict::Accepted,
            })
            .await
            .unwrap();

        assert_eq!(completed.status, RideStatus::Completed);
        assert_eq!(payment.status, PaymentStatus::Accepted);
        assert!(fx.index.slots.lock().unwrap().is_empty());
        assert_eq!(fx.notifier.count("completed"), 1);
    }

    #[tokio::test]
    async fn rejected_payment_can_be_retried() {
        let fx = fixture();
        let ride = ongoing_ride(&fx).await;
        bill(&fx, ride.id, 9000).await;
        fx.lifecycle.ride_arrived(ride.id, 1.0).await.unwrap();

        let (after_reject, payment) = fx
            .lifecycle
            .process_payment(PaymentProcessRequest {
                ride_id: ride.id,
                total_cost: 9000,
                status: PaymentVerdict::Rejected,
            })
            .await
            .unwrap();
        assert_eq!(after_reject.status, RideStatus::Ongoing);
        assert_eq!(payment.status, PaymentStatus::Rejected);

        let (completed, payment) = fx
            .lifecycle
            .process_payment(PaymentProcessRequest {
                ride_id: ride.id,
                total_cost: 9000,
                status: PaymentVerdict::Accepted,
            })
            .await
            .unwrap();
        assert_eq!(completed.status, RideStatus::Completed);
        assert_eq!(payment.status, PaymentStatus::Accepted);
    }

    #[tokio::test]
    async fn duplicate_acceptance_converges_instead_of_failing() {
        let fx = fixture();
        let ride = ongoing_ride(&fx).await;
        bill(&fx, ride.id, 9000).await;
        fx.lifecycle.ride_arrived(ride.id, 1.0).await.unwrap();

        let request = PaymentProcessRequest {
            ride_id: ride.id,
            total_cost: 9000,
            status: PaymentVerdict::Accepted,
        };
        fx.lifecycle.process_payment(request.clone()).await.unwrap();
        let (ride_again, payment) = fx.lifecycle.process_payment(request).await.unwrap();

        assert_eq!(ride_again.status, RideStatus::Completed);
        assert_eq!(payment.status, PaymentStatus::Accepted);
    }

    #[tokio::test]
    async fn cancel_releases_the_participants() {
        let fx = fixture();
        let ride = fx.lifecycle.create_ride(&accepted_match()).await.unwrap();

        let cancelled = fx.lifecycle.cancel_ride(ride.id).await.unwrap();
        assert_eq!(cancelled.status, RideStatus::Cancelled);
        assert!(fx.index.slots.lock().unwrap().is_empty());

        let err = fx.lifecycle.cancel_ride(ride.id).await.unwrap_err();
        assert!(matches!(err, RideError::InvalidState(RideStatus::Cancelled)));
    }

    #[test]
    fn adjustment_clamp_resets_out_of_range_values() {
        assert_eq!(clamp_adjustment(0.0), 0.0);
        assert_eq!(clamp_adjustment(0.8), 0.8);
        assert_eq!(clamp_adjustment(1.0), 1.0);
        assert_eq!(clamp_adjustment(-0.1), 1.0);
        assert_eq!(clamp_adjustment(1.7), 1.0);
        assert_eq!(clamp_adjustment(f64::NAN), 1.0);
    }

    #[test]
    fn payment_math_matches_the_fare_model() {
        let (adjusted, fee, payout) = compute_payment(9000, 0.8, 5.0);
        assert_eq!((adjusted, fee, payout), (7200, 360, 6840));

        let (adjusted, fee, payout) = compute_payment(0, 1.0, 5.0);
        assert_eq!((adjusted, fee, payout), (0, 0, 0));

        // Rounding happens at each step.
        let (adjusted, fee, payout) = compute_payment(1001, 0.5, 5.0);
        assert_eq!(adjusted, 501);
        assert_eq!(fee, 25);
        assert_eq!(payout, 476);
    }
}
