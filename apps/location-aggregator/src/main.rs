mod config;
mod http;
mod tracker;

use crate::config::Config;
use crate::tracker::Tracker;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tumpang_core::bus::{self, ConsumerSpec, Publisher};
use tumpang_core::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init("location_aggregator")?;

    let js = bus::connect(&config.nats_url).await?;
    bus::ensure_streams(&js).await?;

    let redis_client =
        redis::Client::open(config.redis_url.as_str()).context("invalid LOCATION_REDIS_URL")?;
    let redis = redis::aio::ConnectionManager::new(redis_client)
        .await
        .context("failed to connect to redis")?;

    let tracker = Arc::new(Tracker::new(
        redis.clone(),
        Publisher::new(js.clone()),
        config.rate_per_km,
    ));

    let cancel = CancellationToken::new();
    let consumer_tracker = tracker.clone();
    let consumer_handle = tokio::spawn(bus::consume(
        js,
        ConsumerSpec {
            stream: bus::STREAM_LOCATION,
            durable: "location-aggregator",
            subject: bus::subject::LOCATION_UPDATE,
            deliver_new_only: false,
        },
        cancel.clone(),
        move |payload| {
            let tracker = consumer_tracker.clone();
            async move {
                let envelope = bus::decode(&payload)?;
                tracker.handle_update(envelope).await
            }
        },
    ));

    let app = http::router(http::HttpState { redis });
    let listener = tokio::net::TcpListener::bind(&config.http_bind)
        .await
        .with_context(|| format!("failed to bind {}", config.http_bind))?;
    tracing::info!(bind = %config.http_bind, "location-aggregator listening");
    let http_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = consumer_handle => {}
        _ = http_handle => {}
    }
    cancel.cancel();

    Ok(())
}
