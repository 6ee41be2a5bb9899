mod active_ride;
mod config;
mod consumers;
mod error;
mod lifecycle;
mod notify;
mod ports;
mod repo;
mod routes;
mod state;

use crate::config::Config;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tumpang_core::bus::{self, Publisher};
use tumpang_core::{db, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init("ride_lifecycle")?;

    let pool = db::connect_lazy(&config.database_url)?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run ride-lifecycle migrations")?;

    let js = bus::connect(&config.nats_url).await?;
    bus::ensure_streams(&js).await?;

    let redis_client =
        redis::Client::open(config.redis_url.as_str()).context("invalid RIDES_REDIS_URL")?;
    let redis = redis::aio::ConnectionManager::new(redis_client)
        .await
        .context("failed to connect to redis")?;

    let lifecycle = Arc::new(lifecycle::RideLifecycle::new(
        Arc::new(repo::PgRideRepo::new(pool.clone())),
        Arc::new(active_ride::RedisActiveRideIndex::new(redis.clone())),
        Arc::new(notify::BusRideNotifier::new(Publisher::new(js.clone()))),
        config.admin_fee_percent,
        config.qr_base_url.clone(),
    ));

    let cancel = CancellationToken::new();
    let consumer_handles = consumers::spawn(js, lifecycle.clone(), cancel.clone());

    let state = state::AppState {
        config: config.clone(),
        lifecycle,
        db: pool,
        redis,
    };

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.http_bind)
        .await
        .with_context(|| format!("failed to bind {}", config.http_bind))?;
    tracing::info!(bind = %config.http_bind, "ride-lifecycle listening");
    let http_handle = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .ok();
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = http_handle => {}
    }
    cancel.cancel();
    for handle in consumer_handles {
        handle.abort();
    }

    Ok(())
}
