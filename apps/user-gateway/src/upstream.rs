use crate::config::Config;
use crate::error::GatewayError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tumpang_core::domain::{Location, MatchProposal, Payment, PaymentRequest, Ride};
use tumpang_core::events::{MatchConfirmRequest, PaymentVerdict};
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub ride: Ride,
    pub payment: Payment,
}

/// HTTP clients for the match and ride services, authenticated with each
/// service's API key.
pub struct UpstreamClients {
    http: reqwest::Client,
    match_base_url: String,
    match_api_key: String,
    rides_base_url: String,
    rides_api_key: String,
}

impl UpstreamClients {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            match_base_url: config.match_base_url.trim_end_matches('/').to_string(),
            match_api_key: config.match_api_key.clone(),
            rides_base_url: config.rides_base_url.trim_end_matches('/').to_string(),
            rides_api_key: config.rides_api_key.clone(),
        })
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: String,
        api_key: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let response = self
            .http
            .post(&url)
            .header("X-API-Key", api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| GatewayError::server("upstream_unreachable", format!("{url}: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|err| GatewayError::server("upstream_decode", format!("{url}: {err}")));
        }

        let message = response.text().await.unwrap_or_default();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(GatewayError::security(
                "upstream_denied",
                format!("{url}: {status}: {message}"),
            ))
        } else if status.is_client_error() {
            // Service error messages are already written for end users.
            Err(GatewayError::client("upstream_rejected", message))
        } else {
            Err(GatewayError::server(
                "upstream_failed",
                format!("{url}: {status}: {message}"),
            ))
        }
    }

    pub async fn confirm_match(
        &self,
        request: &MatchConfirmRequest,
    ) -> Result<MatchProposal, GatewayError> {
        self.post_json(
            format!("{}/v1/matches/confirm", self.match_base_url),
            &self.match_api_key,
            request,
        )
        .await
    }

    pub async fn start_ride(
        &self,
        ride_id: Uuid,
        driver_location: &Location,
        passenger_location: &Location,
    ) -> Result<Ride, GatewayError> {
        self.post_json(
            format!("{}/v1/rides/{ride_id}/start", self.rides_base_url),
            &self.rides_api_key,
            &json!({
                "driver_location": driver_location,
                "passenger_location": passenger_location,
            }),
        )
        .await
    }

    pub async fn ride_arrived(
        &self,
        ride_id: Uuid,
        adjustment_factor: f64,
    ) -> Result<PaymentRequest, GatewayError> {
        self.post_json(
            format!("{}/v1/rides/{ride_id}/arrive", self.rides_base_url),
            &self.rides_api_key,
            &json!({ "adjustment_factor": adjustment_factor }),
        )
        .await
    }

    pub async fn process_payment(
        &self,
        ride_id: Uuid,
        total_cost: i64,
        status: PaymentVerdict,
    ) -> Result<PaymentOutcome, GatewayError> {
        self.post_json(
            format!("{}/v1/rides/{ride_id}/payment", self.rides_base_url),
            &self.rides_api_key,
            &json!({ "total_cost": total_cost, "status": status }),
        )
        .await
    }
}
