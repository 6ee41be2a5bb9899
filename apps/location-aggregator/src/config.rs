use anyhow::Result;
use tumpang_core::config::{env_fallback, env_i64, env_string};

#[derive(Debug, Clone)]
pub struct Config {
    pub nats_url: String,
    pub redis_url: String,
    pub http_bind: String,
    /// Fare per kilometer driven, integer IDR.
    pub rate_per_km: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let nats_url = env_string(
            "LOCATION_NATS_URL",
            env_fallback("NATS_URL", "nats://127.0.0.1:4222"),
        )?;
        let redis_url = env_string(
            "LOCATION_REDIS_URL",
            env_fallback("REDIS_URL", "redis://127.0.0.1:6379"),
        )?;
        let http_bind = env_string("LOCATION_HTTP_BIND", Some("127.0.0.1:9204".to_string()))?;
        let rate_per_km = env_i64("LOCATION_RATE_PER_KM", Some(3000))?;
        if rate_per_km <= 0 {
            anyhow::bail!("LOCATION_RATE_PER_KM must be positive");
        }

        Ok(Self {
            nats_url,
            redis_url,
            http_bind,
            rate_per_km,
        })
    }
}
