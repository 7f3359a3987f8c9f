use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::identity::{header_str, resolve_principal};
use crate::models::token::MintError;
use crate::models::{mint, MintOutcome};
use crate::AppState;

pub fn mint_routes() -> Router<AppState> {
    Router::new().route("/request_access", post(request_access))
}

#[derive(Debug, Deserialize)]
pub struct RequestAccessPayload {
    pub seller_id: String,
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RequestAccessResponse {
    pub auth_token: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn err(status: StatusCode, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

async fn request_access(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RequestAccessPayload>,
) -> Result<Json<RequestAccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    let api_key = header_str(&headers, "x-api-key")
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "missing or empty x-api-key"))?;
    let idempotency_key = header_str(&headers, "x-idempotency-key")
        .ok_or_else(|| err(StatusCode::BAD_REQUEST, "missing or empty x-idempotency-key"))?;

    if payload.seller_id.trim().is_empty() {
        return Err(err(StatusCode::BAD_REQUEST, "seller_id must not be empty"));
    }

    let buyer = resolve_principal(&state.pool, api_key)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to resolve buyer identity");
            err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        })?
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "invalid api key"))?;

    let ttl_seconds = state.config.clamp_ttl(payload.ttl_seconds);

    let outcome = mint(
        &state.pool,
        &buyer.id,
        payload.seller_id.trim(),
        state.config.mint_cost,
        idempotency_key,
        ttl_seconds,
    )
    .await
    .map_err(|e| match e {
        MintError::SellerNotFound(seller_id) => {
            err(StatusCode::NOT_FOUND, &format!("unknown seller: {seller_id}"))
        }
        MintError::BuyerNotFound(buyer_id) => {
            tracing::error!(buyer_id, "buyer resolved by identity but missing at mint time");
            err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
        MintError::InsufficientFunds { available, required } => err(
            StatusCode::PAYMENT_REQUIRED,
            &format!("insufficient balance: available {available}, required {required}"),
        ),
        MintError::Database(e) => {
            tracing::error!(error = %e, "store error during mint");
            err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    })?;

    let auth_token = match outcome {
        MintOutcome::Minted(token) => {
            tracing::info!(
                buyer_id = %buyer.id,
                seller_id = %payload.seller_id,
                amount = state.config.mint_cost,
                "minted access token"
            );
            token.token_id
        }
        MintOutcome::Replayed { token_id } => {
            tracing::info!(buyer_id = %buyer.id, %token_id, "replayed mint for known idempotency key");
            token_id
        }
    };

    Ok(Json(RequestAccessResponse { auth_token }))
}
