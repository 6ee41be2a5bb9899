use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tumpang_core::domain::{User, UserRole};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    msisdn: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let role = match self.role.as_str() {
            "driver" => UserRole::Driver,
            "passenger" => UserRole::Passenger,
            other => anyhow::bail!("user {} has unknown role {other}", self.id),
        };
        Ok(User {
            id: self.id,
            msisdn: self.msisdn,
            role,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct UsersRepo {
    pool: PgPool,
}

impl UsersRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Registration upsert keyed by canonical MSISDN. A returning user
    /// keeps their id; the role they present wins.
    pub async fn upsert(&self, msisdn: &str, role: UserRole) -> Result<User> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (id, msisdn, role, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (msisdn)
            DO UPDATE SET role = EXCLUDED.role, updated_at = NOW()
            RETURNING id, msisdn, role, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(msisdn)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .context("failed to upsert user")?;
        row.into_user()
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, msisdn, role, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load user")?;
        row.map(UserRow::into_user).transpose()
    }
}
