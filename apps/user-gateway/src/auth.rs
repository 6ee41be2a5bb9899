use crate::error::GatewayError;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tumpang_core::domain::{User, UserRole};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: UserRole,
    exp: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub role: UserRole,
}

/// HS256 token issuance and verification. Claims carry the user id and
/// role; expiry is enforced on decode.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, GatewayError> {
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role,
            exp: (Utc::now() + chrono::Duration::hours(self.ttl_hours)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| GatewayError::server("jwt_encode", err.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, GatewayError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|err| GatewayError::security("jwt_invalid", err.to_string()))?;
        let id = Uuid::parse_str(&data.claims.sub)
            .map_err(|err| GatewayError::security("jwt_subject", err.to_string()))?;
        Ok(AuthenticatedUser {
            id,
            role: data.claims.role,
        })
    }
}

/// Pull the token out of an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
