use crate::ports::{GeoPools, NearbyDriver};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tumpang_core::domain::{Location, UserRole};
use uuid::Uuid;

const DRIVER_POOL_KEY: &str = "pool:drivers";
const PASSENGER_POOL_KEY: &str = "pool:passengers";

fn pool_key(role: UserRole) -> &'static str {
    match role {
        UserRole::Driver => DRIVER_POOL_KEY,
        UserRole::Passenger => PASSENGER_POOL_KEY,
    }
}

/// Geo sets in the key/value store, one per role. Members are user ids;
/// the store's native geo commands keep writes atomic.
pub struct RedisGeoPools {
    redis: redis::aio::ConnectionManager,
}

impl RedisGeoPools {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl GeoPools for RedisGeoPools {
    async fn add(&self, role: UserRole, user_id: Uuid, location: &Location) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: i64 = redis::cmd("GEOADD")
            .arg(pool_key(role))
            .arg(location.longitude)
            .arg(location.latitude)
            .arg(user_id.to_string())
            .query_async(&mut conn)
            .await
            .with_context(|| format!("GEOADD {} failed", pool_key(role)))?;
        Ok(())
    }

    async fn remove(&self, role: UserRole, user_id: Uuid) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: i64 = redis::cmd("ZREM")
            .arg(pool_key(role))
            .arg(user_id.to_string())
            .query_async(&mut conn)
            .await
            .with_context(|| format!("ZREM {} failed", pool_key(role)))?;
        Ok(())
    }

    async fn nearby_drivers(
        &self,
        center: &Location,
        radius_km: f64,
    ) -> Result<Vec<NearbyDriver>> {
        let mut conn = self.redis.clone();
        let rows: Vec<(String, f64, (f64, f64))> = redis::cmd("GEOSEARCH")
            .arg(DRIVER_POOL_KEY)
            .arg("FROMLONLAT")
            .arg(center.longitude)
            .arg(center.latitude)
            .arg("BYRADIUS")
            .arg(radius_km)
            .arg("km")
            .arg("ASC")
            .arg("WITHCOORD")
            .arg("WITHDIST")
            .query_async(&mut conn)
            .await
            .context("GEOSEARCH pool:drivers failed")?;

        let mut found = Vec::with_capacity(rows.len());
        for (member, distance_km, (longitude, latitude)) in rows {
            match Uuid::parse_str(&member) {
                Ok(user_id) => found.push(NearbyDriver {
                    user_id,
                    distance_km,
                    latitude,
                    longitude,
                }),
                Err(_) => {
                    tracing::warn!(member, "non-uuid member in driver pool; skipping");
                }
            }
        }
        Ok(found)
    }
}
