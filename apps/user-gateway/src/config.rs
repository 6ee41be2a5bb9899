use anyhow::{Context, Result};
use std::env;
use tumpang_core::config::{env_fallback, env_i64, env_string};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
    pub redis_url: String,
    pub http_bind: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub match_base_url: String,
    pub match_api_key: String,
    pub rides_base_url: String,
    pub rides_api_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("GATEWAY_DATABASE_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .context("GATEWAY_DATABASE_URL or DATABASE_URL is required")?;
        let nats_url = env_string(
            "GATEWAY_NATS_URL",
            env_fallback("NATS_URL", "nats://127.0.0.1:4222"),
        )?;
        let redis_url = env_string(
            "GATEWAY_REDIS_URL",
            env_fallback("REDIS_URL", "redis://127.0.0.1:6379"),
        )?;
        let http_bind = env_string("GATEWAY_HTTP_BIND", Some("127.0.0.1:9201".to_string()))?;

        let jwt_secret = env_string("GATEWAY_JWT_SECRET", None)?;
        if jwt_secret.len() < 16 {
            anyhow::bail!("GATEWAY_JWT_SECRET must be at least 16 characters");
        }
        let jwt_ttl_hours = env_i64("GATEWAY_JWT_TTL_HOURS", Some(24))?;

        let match_base_url = env_string(
            "GATEWAY_MATCH_URL",
            Some("http://127.0.0.1:9202".to_string()),
        )?;
        let match_api_key = env_string("GATEWAY_MATCH_API_KEY", None)?;
        let rides_base_url = env_string(
            "GATEWAY_RIDES_URL",
            Some("http://127.0.0.1:9203".to_string()),
        )?;
        let rides_api_key = env_string("GATEWAY_RIDES_API_KEY", None)?;

        Ok(Self {
            database_url,
            nats_url,
            redis_url,
            http_bind,
            jwt_secret,
            jwt_ttl_hours,
            match_base_url,
            match_api_key,
            rides_base_url,
            rides_api_key,
        })
    }
}
