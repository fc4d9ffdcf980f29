//! Application state shared across handlers

use std::sync::Arc;

use sqlx::PgPool;
use tutoring::TutoringService;
use tutoring::clock::Clock;

use crate::middleware::JwtConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: TutoringService,
    pub jwt: Arc<JwtConfig>,
    pub clock: Arc<dyn Clock>,
    /// Present when sessions are persisted in Postgres
    pub db_pool: Option<PgPool>,
}
