mod auth;
mod config;
mod error;
mod notifier;
mod otp;
mod registry;
mod routes;
mod state;
mod upstream;
mod users_repo;
mod ws;

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
    logging::init("user_gateway")?;

    let pool = db::connect_lazy(&config.database_url)?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run user-gateway migrations")?;

    let js = bus::connect(&config.nats_url).await?;
    bus::ensure_streams(&js).await?;

    let redis_client =
        redis::Client::open(config.redis_url.as_str()).context("invalid GATEWAY_REDIS_URL")?;
    let redis = redis::aio::ConnectionManager::new(redis_client)
        .await
        .context("failed to connect to redis")?;

    let registry = Arc::new(registry::ClientRegistry::new());
    let cancel = CancellationToken::new();
    let notifier_handles = notifier::spawn(js.clone(), registry.clone(), cancel.clone());

    let state = state::AppState {
        jwt: auth::JwtKeys::new(&config.jwt_secret, config.jwt_ttl_hours),
        upstream: Arc::new(upstream::UpstreamClients::new(&config)?),
        users: Arc::new(users_repo::UsersRepo::new(pool.clone())),
        otp: otp::OtpStore::new(redis.clone()),
        publisher: Publisher::new(js),
        registry,
        db: pool,
        redis,
        config,
    };

    let app = routes::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&state.config.http_bind)
        .await
        .with_context(|| format!("failed to bind {}", state.config.http_bind))?;
    tracing::info!(bind = %state.config.http_bind, "user-gateway listening");
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
    for handle in notifier_handles {
        handle.abort();
    }

    Ok(())
}
