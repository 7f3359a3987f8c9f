use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

/// An append-only record of a completed settlement. Never modified after
/// insert — the only writer is [`crate::models::token::settle`].
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub buyer_id: String,
    pub seller_id: String,
    pub amount: i64,
    pub token_id: String,
    pub settled_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub async fn count_for_buyer(pool: &PgPool, buyer_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM ledger WHERE buyer_id = $1")
            .bind(buyer_id)
            .fetch_one(pool)
            .await
    }

    pub async fn history_for_buyer(
        pool: &PgPool,
        buyer_id: &str,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM ledger WHERE buyer_id = $1 ORDER BY settled_at DESC, id DESC LIMIT $2",
        )
        .bind(buyer_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
