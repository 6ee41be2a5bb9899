use anyhow::{Context, Result};
use std::env;
use tumpang_core::config::{env_f64, env_fallback, env_string};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
    pub redis_url: String,
    pub http_bind: String,
    /// Key the gateway must present in `X-API-Key`.
    pub api_key: String,
    /// Driver search radius around a finder's location, kilometers.
    pub search_radius_km: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("MATCH_DATABASE_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .context("MATCH_DATABASE_URL or DATABASE_URL is required")?;
        let nats_url = env_string(
            "MATCH_NATS_URL",
            env_fallback("NATS_URL", "nats://127.0.0.1:4222"),
        )?;
        let redis_url = env_string(
            "MATCH_REDIS_URL",
            env_fallback("REDIS_URL", "redis://127.0.0.1:6379"),
        )?;
        let http_bind = env_string("MATCH_HTTP_BIND", Some("127.0.0.1:9202".to_string()))?;
        let api_key = env_string("MATCH_API_KEY", None)?;
        if api_key.is_empty() {
            anyhow::bail!("MATCH_API_KEY must not be empty");
        }
        let search_radius_km = env_f64("MATCH_SEARCH_RADIUS_KM", Some(5.0))?;
        if !(search_radius_km > 0.0) {
            anyhow::bail!("MATCH_SEARCH_RADIUS_KM must be positive");
        }

        Ok(Self {
            database_url,
            nats_url,
            redis_url,
            http_bind,
            api_key,
            search_radius_km,
        })
    }
}
