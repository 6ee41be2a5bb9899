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
    /// Platform cut of the adjusted fare, in percent.
    pub admin_fee_percent: f64,
    /// Base URL the payment QR points at.
    pub qr_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("RIDES_DATABASE_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .context("RIDES_DATABASE_URL or DATABASE_URL is required")?;
        let nats_url = env_string(
            "RIDES_NATS_URL",
            env_fallback("NATS_URL", "nats://127.0.0.1:4222"),
        )?;
        let redis_url = env_string(
            "RIDES_REDIS_URL",
            env_fallback("REDIS_URL", "redis://127.0.0.1:6379"),
        )?;
        let http_bind = env_string("RIDES_HTTP_BIND", Some("127.0.0.1:9203".to_string()))?;
        let api_key = env_string("RIDES_API_KEY", None)?;
        if api_key.is_empty() {
            anyhow::bail!("RIDES_API_KEY must not be empty");
        }
        let admin_fee_percent = env_f64("RIDES_ADMIN_FEE_PERCENT", Some(5.0))?;
        if !(0.0..=100.0).contains(&admin_fee_percent) {
            anyhow::bail!("RIDES_ADMIN_FEE_PERCENT must be between 0 and 100");
        }
        let qr_base_url = env_string(
            "RIDES_QR_BASE_URL",
            Some("https://pay.tumpang.local/qr".to_string()),
        )?;

        Ok(Self {
            database_url,
            nats_url,
            redis_url,
            http_bind,
            api_key,
            admin_fee_percent,
            qr_base_url,
        })
    }
}
