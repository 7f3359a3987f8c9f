use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
    })
}
