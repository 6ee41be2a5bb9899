use crate::config::Config;
use crate::engine::MatchEngine;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<MatchEngine>,
    pub db: PgPool,
    pub redis: redis::aio::ConnectionManager,
}
