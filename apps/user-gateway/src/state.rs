use crate::auth::JwtKeys;
use crate::config::Config;
use crate::otp::OtpStore;
use crate::registry::ClientRegistry;
use crate::upstream::UpstreamClients;
use crate::users_repo::UsersRepo;
use sqlx::PgPool;
use std::sync::Arc;
use tumpang_core::bus::Publisher;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub redis: redis::aio::ConnectionManager,
    pub registry: Arc<ClientRegistry>,
    pub publisher: Publisher,
    pub upstream: Arc<UpstreamClients>,
    pub jwt: JwtKeys,
    pub users: Arc<UsersRepo>,
    pub otp: OtpStore,
}
