pub mod config;
pub mod db;
pub mod identity;
pub mod models;
pub mod routes;
pub mod scheduler;

use sqlx::PgPool;

use config::Config;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: std::sync::Arc<Config>,
}
