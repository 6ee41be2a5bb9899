use anyhow::{anyhow, Context, Result};
use std::env;

/// Read an env var, falling back to `default`; a missing var with no
/// default is a startup error.
pub fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

/// Default chain for shared infrastructure URLs: the service-prefixed
/// var wins, then the unprefixed var, then the literal default.
pub fn env_fallback(key: &str, default: &str) -> Option<String> {
    Some(
        env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()),
    )
}

pub fn env_i64(key: &str, default: Option<i64>) -> Result<i64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<i64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

pub fn env_f64(key: &str, default: Option<f64>) -> Result<f64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}
