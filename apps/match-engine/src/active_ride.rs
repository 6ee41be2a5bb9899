use crate::ports::ActiveRides;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tumpang_core::keys::{active_ride_key, ACTIVE_RIDE_TTL_SECS};
use uuid::Uuid;

/// Active-ride index in the key/value store. The accepted transition's
/// check-and-take maps onto `SET .. NX EX`, which is atomic at the store.
pub struct RedisActiveRides {
    redis: redis::aio::ConnectionManager,
}

impl RedisActiveRides {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl ActiveRides for RedisActiveRides {
    async fn get(&self, user_id: Uuid) -> Result<Option<Uuid>> {
        let mut conn = self.redis.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(active_ride_key(user_id))
            .query_async(&mut conn)
            .await
            .context("active-ride GET failed")?;
        match value {
            None => Ok(None),
            Some(raw) => Uuid::parse_str(&raw)
                .map(Some)
                .with_context(|| format!("active-ride slot for {user_id} holds a non-uuid value")),
        }
    }

    async fn try_take(&self, user_id: Uuid, ride_ref: Uuid) -> Result<bool> {
        let mut conn = self.redis.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(active_ride_key(user_id))
            .arg(ride_ref.to_string())
            .arg("NX")
            .arg("EX")
            .arg(ACTIVE_RIDE_TTL_SECS)
            .query_async(&mut conn)
            .await
            .context("active-ride SET NX failed")?;
        Ok(reply.is_some())
    }

    async fn release(&self, user_id: Uuid) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(active_ride_key(user_id))
            .query_async(&mut conn)
            .await
            .context("active-ride DEL failed")?;
        Ok(())
    }
}
