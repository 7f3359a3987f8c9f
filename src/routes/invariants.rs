use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::identity::{admin_key_matches, header_str};
use crate::models::token::count_live_for_buyer;
use crate::models::{LedgerEntry, Principal};
use crate::AppState;

pub fn invariants_routes() -> Router<AppState> {
    Router::new().route("/invariants", get(invariants))
}

/// How many of a buyer's most recent settlements to include inline — enough
/// to eyeball invariant 2 without a separate ledger query.
const RECENT_SETTLEMENT_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct InvariantsQuery {
    pub buyer_id: Option<String>,
    pub seller_id: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct BuyerView {
    pub balance: i64,
    pub escrow_balance: i64,
    pub live_tokens: i64,
    pub settled_count: i64,
    pub recent_settlements: Vec<LedgerEntry>,
}

#[derive(Debug, Serialize, Default)]
pub struct SellerView {
    pub total_earned: i64,
    pub reputation: i64,
}

#[derive(Debug, Serialize, Default)]
pub struct InvariantsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer: Option<BuyerView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller: Option<SellerView>,
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

/// Diagnostic-only: exposes the internal balances a careful caller would
/// otherwise have to reconstruct from `/verify` replay traffic. Never part
/// of the buyer/seller transactional surface, hence gated on the admin key
/// rather than a principal credential.
async fn invariants(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<InvariantsQuery>,
) -> Result<Json<InvariantsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let presented = header_str(&headers, "x-admin-key")
        .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "missing x-admin-key"))?;

    if !admin_key_matches(presented, &state.config.admin_key) {
        return Err(err(StatusCode::FORBIDDEN, "invalid admin key"));
    }

    let mut response = InvariantsResponse::default();

    if let Some(buyer_id) = query.buyer_id.as_deref() {
        let principal = Principal::find_by_id(&state.pool, buyer_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "store error resolving buyer for invariants");
                err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            })?
            .ok_or_else(|| err(StatusCode::NOT_FOUND, "unknown buyer"))?;

        let live_tokens = count_live_for_buyer(&state.pool, buyer_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "store error counting live tokens");
                err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            })?;

        let settled_count = LedgerEntry::count_for_buyer(&state.pool, buyer_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "store error counting settled ledger rows");
                err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            })?;

        let recent_settlements =
            LedgerEntry::history_for_buyer(&state.pool, buyer_id, RECENT_SETTLEMENT_LIMIT)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "store error fetching settlement history");
                    err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
                })?;

        response.buyer = Some(BuyerView {
            balance: principal.balance,
            escrow_balance: principal.escrow_balance,
            live_tokens,
            settled_count,
            recent_settlements,
        });
    }

    if let Some(seller_id) = query.seller_id.as_deref() {
        let principal = Principal::find_by_id(&state.pool, seller_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "store error resolving seller for invariants");
                err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            })?
            .ok_or_else(|| err(StatusCode::NOT_FOUND, "unknown seller"))?;

        response.seller = Some(SellerView {
            total_earned: principal.total_earned,
            reputation: principal.reputation,
        });
    }

    Ok(Json(response))
}
