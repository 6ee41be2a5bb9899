use crate::ports::{MatchRepo, ProposalImage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tumpang_core::domain::{Location, MatchProposal, MatchStatus};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "id, driver_id, passenger_id, driver_lat, driver_lng, \
     passenger_lat, passenger_lng, target_lat, target_lng, status, \
     driver_confirmed, passenger_confirmed, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct MatchRow {
    id: Uuid,
    driver_id: Uuid,
    passenger_id: Uuid,
    driver_lat: f64,
    driver_lng: f64,
    passenger_lat: f64,
    passenger_lng: f64,
    target_lat: f64,
    target_lng: f64,
    status: String,
    driver_confirmed: bool,
    passenger_confirmed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MatchRow {
    fn into_proposal(self) -> Result<MatchProposal> {
        let status = MatchStatus::parse(&self.status)
            .with_context(|| format!("match {} has unknown status {}", self.id, self.status))?;
        let at = self.created_at;
        Ok(MatchProposal {
            id: self.id,
            driver_id: self.driver_id,
            passenger_id: self.passenger_id,
            driver_location: Location {
                latitude: self.driver_lat,
                longitude: self.driver_lng,
                ts: at,
            },
            passenger_location: Location {
                latitude: self.passenger_lat,
                longitude: self.passenger_lng,
                ts: at,
            },
            target_location: Location {
                latitude: self.target_lat,
                longitude: self.target_lng,
                ts: at,
            },
            status,
            driver_confirmed: self.driver_confirmed,
            passenger_confirmed: self.passenger_confirmed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct PgMatchRepo {
    pool: PgPool,
}

impl PgMatchRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchRepo for PgMatchRepo {
    async fn insert(&self, proposal: &MatchProposal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO matches (
                id, driver_id, passenger_id,
                driver_lat, driver_lng, passenger_lat, passenger_lng,
                target_lat, target_lng,
                status, driver_confirmed, passenger_confirmed,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(proposal.id)
        .bind(proposal.driver_id)
        .bind(proposal.passenger_id)
        .bind(proposal.driver_location.latitude)
        .bind(proposal.driver_location.longitude)
        .bind(proposal.passenger_location.latitude)
        .bind(proposal.passenger_location.longitude)
        .bind(proposal.target_location.latitude)
        .bind(proposal.target_location.longitude)
        .bind(proposal.status.as_str())
        .bind(proposal.driver_confirmed)
        .bind(proposal.passenger_confirmed)
        .bind(proposal.created_at)
        .bind(proposal.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to insert match proposal")?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MatchProposal>> {
        let row: Option<MatchRow> =
            sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM matches WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to load match proposal")?;
        row.map(MatchRow::into_proposal).transpose()
    }

    async fn compare_and_update(
        &self,
        id: Uuid,
        expected: ProposalImage,
        next: ProposalImage,
    ) -> Result<Option<MatchProposal>> {
        let row: Option<MatchRow> = sqlx::query_as(&format!(
            r#"
            UPDATE matches
            SET status = $2,
                driver_confirmed = $3,
                passenger_confirmed = $4,
                updated_at = NOW()
            WHERE id = $1
              AND status = $5
              AND driver_confirmed = $6
              AND passenger_confirmed = $7
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(next.status.as_str())
        .bind(next.driver_confirmed)
        .bind(next.passenger_confirmed)
        .bind(expected.status.as_str())
        .bind(expected.driver_confirmed)
        .bind(expected.passenger_confirmed)
        .fetch_optional(&self.pool)
        .await
        .context("failed to update match proposal")?;
        row.map(MatchRow::into_proposal).transpose()
    }

    async fn open_for_passenger(
        &self,
        passenger_id: Uuid,
        exclude: Uuid,
    ) -> Result<Vec<MatchProposal>> {
        let rows: Vec<MatchRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM matches
            WHERE passenger_id = $1
              AND id <> $2
              AND status IN ('pending', 'driver-confirmed')
            ORDER BY created_at
            "#
        ))
        .bind(passenger_id)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await
        .context("failed to list open proposals")?;
        rows.into_iter().map(MatchRow::into_proposal).collect()
    }
}
