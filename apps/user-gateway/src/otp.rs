use crate::error::GatewayError;
use anyhow::Context;
use rand::Rng;

const OTP_TTL_SECS: u64 = 5 * 60;

fn otp_key(msisdn: &str) -> String {
    format!("otp:{msisdn}")
}

pub fn generate_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{code:04}")
}

/// One-time codes live in the key/value store under a short TTL and are
/// consumed atomically on verification (GETDEL), so a code can never be
/// redeemed twice.
#[derive(Clone)]
pub struct OtpStore {
    redis: redis::aio::ConnectionManager,
}

impl OtpStore {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn issue(&self, msisdn: &str, code: &str) -> Result<(), GatewayError> {
        let mut conn = self.redis.clone();
        let stored: Result<(), _> = redis::cmd("SET")
            .arg(otp_key(msisdn))
            .arg(code)
            .arg("EX")
            .arg(OTP_TTL_SECS)
            .query_async(&mut conn)
            .await
            .context("failed to store otp");
        stored.map_err(|err| GatewayError::server("otp_store", format!("{err:#}")))
    }

    pub async fn consume(&self, msisdn: &str, presented: &str) -> Result<bool, GatewayError> {
        let mut conn = self.redis.clone();
        let stored: Option<String> = redis::cmd("GETDEL")
            .arg(otp_key(msisdn))
            .query_async(&mut conn)
            .await
            .map_err(|err| GatewayError::server("otp_read", err.to_string()))?;
        Ok(stored.as_deref() == Some(presented))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_four_digits() {
        for _ in 0..64 {
            let code = generate_code();
            assert_eq!(code.len(), 4);
            assert!(code.chars().all(|ch| ch.is_ascii_digit()));
        }
    }
}
