use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};

/// A buyer or seller account. There is no stored role: a principal acts as
/// a buyer when it presents `x-api-key` to `/request_access` and as a
/// seller when it's named as `seller_id` in a mint, or presents
/// `x-seller-api-key` to `/verify`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Principal {
    pub id: String,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub balance: i64,
    pub escrow_balance: i64,
    pub total_earned: i64,
    pub reputation: i64,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    pub fn hash_api_key(api_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Resolve a presented credential to a principal. Used by both the
    /// buyer and seller auth paths — which role the credential plays is
    /// decided by the caller, not by this lookup.
    pub async fn find_by_api_key(pool: &PgPool, api_key: &str) -> Result<Option<Self>, sqlx::Error> {
        let hash = Self::hash_api_key(api_key);
        sqlx::query_as::<_, Self>("SELECT * FROM principals WHERE api_key_hash = $1")
            .bind(hash)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM principals WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn exists(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM principals WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }

    /// Seed a principal with an initial balance (operator/test use; not part
    /// of the buyer/seller transactional surface).
    pub async fn create(
        pool: &PgPool,
        id: &str,
        api_key: &str,
        initial_balance: i64,
    ) -> Result<Self, sqlx::Error> {
        let hash = Self::hash_api_key(api_key);
        sqlx::query_as::<_, Self>(
            "INSERT INTO principals (id, api_key_hash, balance) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(id)
        .bind(hash)
        .bind(initial_balance)
        .fetch_one(pool)
        .await
    }

    /// Lock a principal row for update inside an existing transaction.
    pub async fn lock_for_update<'a>(
        tx: &mut Transaction<'a, Postgres>,
        id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM principals WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }
}
