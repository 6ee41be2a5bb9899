use crate::ports::ActiveRideIndex;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tumpang_core::keys::{active_ride_key, ACTIVE_RIDE_TTL_SECS};
use uuid::Uuid;

/// Active-ride index writes for the ride lifecycle: assignment overwrites
/// the slot the match engine took (replacing the match id with the ride
/// id) and refreshes the TTL.
pub struct RedisActiveRideIndex {
    redis: redis::aio::ConnectionManager,
}

impl RedisActiveRideIndex {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl ActiveRideIndex for RedisActiveRideIndex {
    async fn assign(&self, user_id: Uuid, ride_id: Uuid) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: () = redis::cmd("SET")
            .arg(active_ride_key(user_id))
            .arg(ride_id.to_string())
            .arg("EX")
            .arg(ACTIVE_RIDE_TTL_SECS)
            .query_async(&mut conn)
            .await
            .context("active-ride SET failed")?;
        Ok(())
    }

    async fn clear(&self, user_id: Uuid) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(active_ride_key(user_id))
            .query_async(&mut conn)
            .await
            .context("active-ride DEL failed")?;
        Ok(())
    }
}
