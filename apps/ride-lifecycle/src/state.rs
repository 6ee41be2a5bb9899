use crate::config::Config;
use crate::lifecycle::RideLifecycle;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub lifecycle: Arc<RideLifecycle>,
    pub db: PgPool,
    pub redis: redis::aio::ConnectionManager,
}
