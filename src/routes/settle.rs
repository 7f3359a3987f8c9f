use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use crate::identity::{header_str, resolve_principal};
use crate::models::{settle, SettleOutcome};
use crate::AppState;

pub fn settle_routes() -> Router<AppState> {
    Router::new().route("/verify/:token", get(verify))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResponse {
    fn valid(buyer_id: String) -> Self {
        Self {
            valid: true,
            buyer_id: Some(buyer_id),
            error: None,
        }
    }

    fn invalid(code: &str) -> Self {
        Self {
            valid: false,
            buyer_id: None,
            error: Some(code.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

async fn verify(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<VerifyResponse>, (StatusCode, Json<ErrorResponse>)> {
    let seller_api_key = header_str(&headers, "x-seller-api-key").ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "missing x-seller-api-key".into(),
            }),
        )
    })?;

    let seller = resolve_principal(&state.pool, seller_api_key)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to resolve seller identity");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error".into(),
                }),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "invalid seller api key".into(),
                }),
            )
        })?;

    let outcome = settle(
        &state.pool,
        &token_id,
        &seller.id,
        Utc::now(),
        state.config.seller_mismatch_burns_token,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "store error during settle");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "internal error".into(),
            }),
        )
    })?;

    let response = match outcome {
        SettleOutcome::Settled { buyer_id } => {
            tracing::info!(seller_id = %seller.id, %buyer_id, %token_id, "settled token");
            VerifyResponse::valid(buyer_id)
        }
        SettleOutcome::SellerMismatch => VerifyResponse::invalid("SELLER_MISMATCH"),
        SettleOutcome::Expired => {
            if state.config.distinguish_expired {
                VerifyResponse::invalid("EXPIRED")
            } else {
                VerifyResponse::invalid("ALREADY_USED")
            }
        }
        SettleOutcome::NotFound => {
            if state.config.distinguish_not_found {
                VerifyResponse::invalid("NOT_FOUND")
            } else {
                VerifyResponse::invalid("ALREADY_USED")
            }
        }
    };

    Ok(Json(response))
}
