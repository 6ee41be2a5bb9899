use anyhow::Result;
use async_trait::async_trait;
use tumpang_core::domain::{BillingEntry, Payment, PaymentRequest, PaymentStatus, Ride, RideStatus};
use uuid::Uuid;

/// Outcome of an idempotent ride insert: the unique index on match id
/// turns a redelivered `match.accepted` into `Existing`.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Inserted(Ride),
    Existing(Ride),
}

impl CreateOutcome {
    pub fn ride(&self) -> &Ride {
        match self {
            CreateOutcome::Inserted(ride) | CreateOutcome::Existing(ride) => ride,
        }
    }
}

#[async_trait]
pub trait RideRepo: Send + Sync {
    async fn create(&self, ride: &Ride) -> Result<CreateOutcome>;
    async fn get(&self, id: Uuid) -> Result<Option<Ride>>;
    /// Status CAS; None when the ride was not in `from`.
    async fn update_status(
        &self,
        id: Uuid,
        from: RideStatus,
        to: RideStatus,
    ) -> Result<Option<Ride>>;
    /// Append a ledger entry and bump the ride's total in one atomic
    /// step. Returns false when the entry id was already recorded.
    async fn append_billing(&self, entry: &BillingEntry) -> Result<bool>;
    async fn sum_ledger(&self, ride_id: Uuid) -> Result<i64>;
    /// Insert the ride's payment; the unique index on ride id makes a
    /// second arrival return the stored row.
    async fn insert_payment(&self, payment: &Payment) -> Result<Payment>;
    async fn get_payment(&self, ride_id: Uuid) -> Result<Option<Payment>>;
    /// Settle the payment. Accepted is terminal: None when the payment
    /// was already accepted.
    async fn settle_payment(&self, ride_id: Uuid, to: PaymentStatus) -> Result<Option<Payment>>;
}

/// Active-ride index writes owned by this service: assignment at ride
/// creation, clearing at completion or cancellation.
#[async_trait]
pub trait ActiveRideIndex: Send + Sync {
    async fn assign(&self, user_id: Uuid, ride_id: Uuid) -> Result<()>;
    async fn clear(&self, user_id: Uuid) -> Result<()>;
}

/// Outbound ride events; backed by the bus in production. Implementations
/// must publish with ids deterministic per (event, ride) so redeliveries
/// collapse in the broker's dedup window.
#[async_trait]
pub trait RideNotifier: Send + Sync {
    async fn ride_pickup(&self, ride: &Ride) -> Result<()>;
    async fn ride_started(&self, ride: &Ride) -> Result<()>;
    async fn ride_arrived(&self, ride: &Ride, request: &PaymentRequest) -> Result<()>;
    async fn ride_completed(&self, ride: &Ride, payment: &Payment) -> Result<()>;
}
