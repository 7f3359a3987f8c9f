use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::identity::{admin_key_matches, header_str};
use crate::models::token::sweep_batch;
use crate::AppState;

pub fn sweep_routes() -> Router<AppState> {
    Router::new().route("/sweep_expired", post(sweep_expired))
}

#[derive(Debug, Deserialize)]
pub struct SweepQuery {
    pub limit: Option<i64>,
    pub triggered_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub status: &'static str,
    pub swept: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

async fn sweep_expired(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SweepQuery>,
) -> Result<Json<SweepResponse>, (StatusCode, Json<ErrorResponse>)> {
    let presented = header_str(&headers, "x-admin-key").ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "missing x-admin-key".into(),
            }),
        )
    })?;

    if !admin_key_matches(presented, &state.config.admin_key) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "invalid admin key".into(),
            }),
        ));
    }

    let limit = query
        .limit
        .unwrap_or(state.config.sweep_default_limit)
        .clamp(1, state.config.sweep_max_limit);

    let swept = sweep_batch(&state.pool, Utc::now(), limit).await.map_err(|e| {
        tracing::error!(error = %e, "store error during sweep");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "internal error".into(),
            }),
        )
    })?;

    tracing::info!(
        swept,
        limit,
        triggered_by = query.triggered_by.as_deref().unwrap_or("operator"),
        "sweep completed"
    );

    Ok(Json(SweepResponse {
        status: "ok",
        swept,
    }))
}
