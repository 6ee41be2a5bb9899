use crate::ports::{CreateOutcome, RideRepo};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tumpang_core::domain::{BillingEntry, Payment, PaymentStatus, Ride, RideStatus};
use uuid::Uuid;

const RIDE_COLUMNS: &str =
    "id, match_id, driver_id, passenger_id, status, total_cost, created_at, updated_at";
const PAYMENT_COLUMNS: &str =
    "id, ride_id, adjusted_cost, admin_fee, driver_payout, status, created_at";

#[derive(sqlx::FromRow)]
struct RideRow {
    id: Uuid,
    match_id: Uuid,
    driver_id: Uuid,
    passenger_id: Uuid,
    status: String,
    total_cost: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RideRow {
    fn into_ride(self) -> Result<Ride> {
        let status = RideStatus::parse(&self.status)
            .with_context(|| format!("ride {} has unknown status {}", self.id, self.status))?;
        Ok(Ride {
            id: self.id,
            match_id: self.match_id,
            driver_id: self.driver_id,
            passenger_id: self.passenger_id,
            status,
            total_cost: self.total_cost,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    ride_id: Uuid,
    adjusted_cost: i64,
    admin_fee: i64,
    driver_payout: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment> {
        let status = PaymentStatus::parse(&self.status)
            .with_context(|| format!("payment {} has unknown status {}", self.id, self.status))?;
        Ok(Payment {
            id: self.id,
            ride_id: self.ride_id,
            adjusted_cost: self.adjusted_cost,
            admin_fee: self.admin_fee,
            driver_payout: self.driver_payout,
            status,
            created_at: self.created_at,
        })
    }
}

pub struct PgRideRepo {
    pool: PgPool,
}

impl PgRideRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn get_by_match(&self, match_id: Uuid) -> Result<Option<Ride>> {
        let row: Option<RideRow> =
            sqlx::query_as(&format!("SELECT {RIDE_COLUMNS} FROM rides WHERE match_id = $1"))
                .bind(match_id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to load ride by match id")?;
        row.map(RideRow::into_ride).transpose()
    }
}

#[async_trait]
impl RideRepo for PgRideRepo {
    async fn create(&self, ride: &Ride) -> Result<CreateOutcome> {
        let row: Option<RideRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO rides (id, match_id, driver_id, passenger_id, status, total_cost, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (match_id) DO NOTHING
            RETURNING {RIDE_COLUMNS}
            "#
        ))
        .bind(ride.id)
        .bind(ride.match_id)
        .bind(ride.driver_id)
        .bind(ride.passenger_id)
        .bind(ride.status.as_str())
        .bind(ride.total_cost)
        .bind(ride.created_at)
        .bind(ride.updated_at)
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert ride")?;

        match row {
            Some(row) => Ok(CreateOutcome::Inserted(row.into_ride()?)),
            None => {
                let existing = self
                    .get_by_match(ride.match_id)
                    .await?
                    .context("ride insert conflicted but no row exists for the match")?;
                Ok(CreateOutcome::Existing(existing))
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Ride>> {
        let row: Option<RideRow> =
            sqlx::query_as(&format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to load ride")?;
        row.map(RideRow::into_ride).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: RideStatus,
        to: RideStatus,
    ) -> Result<Option<Ride>> {
        let row: Option<RideRow> = sqlx::query_as(&format!(
            r#"
            UPDATE rides
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {RIDE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("failed to update ride status")?;
        row.map(RideRow::into_ride).transpose()
    }

    async fn append_billing(&self, entry: &BillingEntry) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open billing transaction")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO billing_entries (id, ride_id, distance_km, cost, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.ride_id)
        .bind(entry.distance_km)
        .bind(entry.cost)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await
        .context("failed to insert billing entry")?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await.ok();
            return Ok(false);
        }

        sqlx::query("UPDATE rides SET total_cost = total_cost + $2, updated_at = NOW() WHERE id = $1")
            .bind(entry.ride_id)
            .bind(entry.cost)
            .execute(&mut *tx)
            .await
            .context("failed to increment ride total")?;

        tx.commit().await.context("failed to commit billing entry")?;
        Ok(true)
    }

    async fn sum_ledger(&self, ride_id: Uuid) -> Result<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(cost), 0)::bigint FROM billing_entries WHERE ride_id = $1",
        )
        .bind(ride_id)
        .fetch_one(&self.pool)
        .await
        .context("failed to sum billing ledger")?;
        Ok(sum)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<Payment> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO payments (id, ride_id, adjusted_cost, admin_fee, driver_payout, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (ride_id) DO NOTHING
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment.id)
        .bind(payment.ride_id)
        .bind(payment.adjusted_cost)
        .bind(payment.admin_fee)
        .bind(payment.driver_payout)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert payment")?;

        match row {
            Some(row) => row.into_payment(),
            None => self
                .get_payment(payment.ride_id)
                .await?
                .context("payment insert conflicted but no row exists for the ride"),
        }
    }

    async fn get_payment(&self, ride_id: Uuid) -> Result<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE ride_id = $1"
        ))
        .bind(ride_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load payment")?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn settle_payment(&self, ride_id: Uuid, to: PaymentStatus) -> Result<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            UPDATE payments
            SET status = $2
            WHERE ride_id = $1 AND status <> 'accepted'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(ride_id)
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("failed to settle payment")?;
        row.map(PaymentRow::into_payment).transpose()
    }
}
