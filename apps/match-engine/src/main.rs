mod active_ride;
mod config;
mod consumers;
mod engine;
mod error;
mod notify;
mod pools;
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
    logging::init("match_engine")?;

    let pool = db::connect_lazy(&config.database_url)?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run match-engine migrations")?;

    let js = bus::connect(&config.nats_url).await?;
    bus::ensure_streams(&js).await?;

    let redis_client =
        redis::Client::open(config.redis_url.as_str()).context("invalid MATCH_REDIS_URL")?;
    let redis = redis::aio::ConnectionManager::new(redis_client)
        .await
        .context("failed to connect to redis")?;

    let engine = Arc::new(engine::MatchEngine::new(
        Arc::new(pools::RedisGeoPools::new(redis.clone())),
        Arc::new(active_ride::RedisActiveRides::new(redis.clone())),
        Arc::new(repo::PgMatchRepo::new(pool.clone())),
        Arc::new(notify::BusMatchNotifier::new(Publisher::new(js.clone()))),
        config.search_radius_km,
    ));

    let cancel = CancellationToken::new();
    let consumer_handles = consumers::spawn(js, engine.clone(), cancel.clone());

    let state = state::AppState {
        config: config.clone(),
        engine,
        db: pool,
        redis,
    };

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.http_bind)
        .await
        .with_context(|| format!("failed to bind {}", config.http_bind))?;
    tracing::info!(bind = %config.http_bind, "match-engine listening");
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
