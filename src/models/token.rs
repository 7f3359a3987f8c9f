use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use sqlx::PgPool;

use super::principal::Principal;

/// A single-use, time-bounded access token. Lifecycle: created by
/// [`mint`], destroyed by [`settle`] or [`sweep_batch`]. Once the row is
/// gone it can never be resurrected — a new mint always gets a fresh id.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TokenRecord {
    pub token_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug)]
pub enum MintOutcome {
    Minted(TokenRecord),
    /// A prior mint under this idempotency key already produced this
    /// token id. The token itself may since have been settled or swept —
    /// replay returns the same id regardless, because the mutation it
    /// represents happened exactly once, at the original call.
    Replayed { token_id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MintError {
    #[error("unknown seller: {0}")]
    SellerNotFound(String),
    #[error("unknown buyer: {0}")]
    BuyerNotFound(String),
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientFunds { available: i64, required: i64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled { buyer_id: String },
    NotFound,
    SellerMismatch,
    Expired,
}

/// Generate an opaque, URL-safe, 128-bit token id. Callers must never parse
/// this — it carries no structure beyond uniqueness.
fn generate_token_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// `TX_MINT`: authenticate buyer, debit balance, credit escrow, insert the
/// token, return it. Idempotent on `(buyer_id, idempotency_key)` — any
/// number of concurrent callers with the same key observe exactly one
/// mint's effect and get back the same token.
///
/// The buyer row is locked with `SELECT ... FOR UPDATE` before the
/// idempotency check runs, so every concurrent mint attempt for this buyer
/// serializes on that lock; the idempotency lookup inside the transaction
/// is therefore race-free without needing its own lock.
pub async fn mint(
    pool: &PgPool,
    buyer_id: &str,
    seller_id: &str,
    cost: i64,
    idempotency_key: &str,
    ttl_seconds: i64,
) -> Result<MintOutcome, MintError> {
    if !Principal::exists(pool, seller_id).await? {
        return Err(MintError::SellerNotFound(seller_id.to_string()));
    }

    let mut tx = pool.begin().await?;

    let buyer = sqlx::query_as::<_, Principal>(
        "SELECT * FROM principals WHERE id = $1 FOR UPDATE",
    )
    .bind(buyer_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(buyer) = buyer else {
        // Buyer existence is enforced by Identity before this is called;
        // absence here means the credential resolved to a row that's gone.
        return Err(MintError::BuyerNotFound(buyer_id.to_string()));
    };

    if let Some(existing_token_id) = sqlx::query_scalar::<_, String>(
        "SELECT token_id FROM idempotency_records WHERE buyer_id = $1 AND idempotency_key = $2",
    )
    .bind(buyer_id)
    .bind(idempotency_key)
    .fetch_optional(&mut *tx)
    .await?
    {
        // A prior mint already produced an id for this key — replay it
        // without touching funds, whether or not the token is still live.
        tx.commit().await?;
        return Ok(MintOutcome::Replayed {
            token_id: existing_token_id,
        });
    }

    if buyer.balance < cost {
        tx.rollback().await?;
        return Err(MintError::InsufficientFunds {
            available: buyer.balance,
            required: cost,
        });
    }

    sqlx::query(
        "UPDATE principals SET balance = balance - $1, escrow_balance = escrow_balance + $1 WHERE id = $2",
    )
    .bind(cost)
    .bind(buyer_id)
    .execute(&mut *tx)
    .await?;

    let token_id = generate_token_id();
    let now = Utc::now();
    let expires_at = now + Duration::seconds(ttl_seconds);

    let token = sqlx::query_as::<_, TokenRecord>(
        "INSERT INTO tokens (token_id, buyer_id, seller_id, amount, created_at, expires_at, idempotency_key)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(&token_id)
    .bind(buyer_id)
    .bind(seller_id)
    .bind(cost)
    .bind(now)
    .bind(expires_at)
    .bind(idempotency_key)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO idempotency_records (buyer_id, idempotency_key, token_id) VALUES ($1, $2, $3)",
    )
    .bind(buyer_id)
    .bind(idempotency_key)
    .bind(&token_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(MintOutcome::Minted(token))
}

/// `TX_SETTLE`: burn the token and credit the seller in one commit. A
/// concurrent second caller holding the same token observes `NotFound`
/// once the first commits, because the row is gone — at-most-once
/// settlement is a direct consequence of single-row deletion under lock.
pub async fn settle(
    pool: &PgPool,
    token_id: &str,
    claimant_seller_id: &str,
    now: DateTime<Utc>,
    burn_on_seller_mismatch: bool,
) -> Result<SettleOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let token = sqlx::query_as::<_, TokenRecord>(
        "SELECT * FROM tokens WHERE token_id = $1 FOR UPDATE",
    )
    .bind(token_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(token) = token else {
        tx.commit().await?;
        return Ok(SettleOutcome::NotFound);
    };

    if token.seller_id != claimant_seller_id {
        if burn_on_seller_mismatch {
            sqlx::query("DELETE FROM tokens WHERE token_id = $1")
                .bind(token_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE principals SET balance = balance + $1, escrow_balance = GREATEST(escrow_balance - $1, 0) WHERE id = $2",
            )
            .bind(token.amount)
            .bind(&token.buyer_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        return Ok(SettleOutcome::SellerMismatch);
    }

    if token.expires_at <= now {
        // Leave the row for Sweep; whoever commits first wins the race.
        tx.commit().await?;
        return Ok(SettleOutcome::Expired);
    }

    sqlx::query("DELETE FROM tokens WHERE token_id = $1")
        .bind(token_id)
        .execute(&mut *tx)
        .await?;

    // Lock buyer and seller rows in a deterministic order to avoid
    // deadlocking against a concurrent settle/mint touching the same pair.
    let mut principal_ids = [token.buyer_id.clone(), token.seller_id.clone()];
    principal_ids.sort();
    for id in &principal_ids {
        Principal::lock_for_update(&mut tx, id).await?;
    }

    sqlx::query(
        "UPDATE principals SET escrow_balance = GREATEST(escrow_balance - $1, 0) WHERE id = $2",
    )
    .bind(token.amount)
    .bind(&token.buyer_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE principals SET total_earned = total_earned + $1, reputation = reputation + 1 WHERE id = $2",
    )
    .bind(token.amount)
    .bind(&token.seller_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO ledger (buyer_id, seller_id, amount, token_id, settled_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&token.buyer_id)
    .bind(&token.seller_id)
    .bind(token.amount)
    .bind(&token.token_id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(SettleOutcome::Settled {
        buyer_id: token.buyer_id,
    })
}

/// `TX_SWEEP`: reclaim up to `limit` expired, unredeemed tokens. Candidates
/// are picked with `SKIP LOCKED` so a concurrent `settle` holding a token's
/// row is never blocked on or raced against; each reclamation commits as
/// its own short transaction so a failure partway through still leaves the
/// tokens already processed reclaimed.
pub async fn sweep_batch(pool: &PgPool, now: DateTime<Utc>, limit: i64) -> Result<u64, sqlx::Error> {
    let candidates: Vec<String> = sqlx::query_scalar(
        "SELECT token_id FROM tokens WHERE expires_at <= $1 ORDER BY token_id LIMIT $2 FOR UPDATE SKIP LOCKED",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut swept = 0u64;
    for token_id in candidates {
        if sweep_one(pool, &token_id, now).await? {
            swept += 1;
        }
    }
    Ok(swept)
}

/// Reclaim a single token if it's still expired and live. Returns `false`
/// if a concurrent settle or sweep already claimed it — the caller's
/// candidate list can go stale between the `SKIP LOCKED` scan and this
/// call, and that's fine: a miss here is not an error.
async fn sweep_one(pool: &PgPool, token_id: &str, now: DateTime<Utc>) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let token = sqlx::query_as::<_, TokenRecord>(
        "SELECT * FROM tokens WHERE token_id = $1 AND expires_at <= $2 FOR UPDATE",
    )
    .bind(token_id)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(token) = token else {
        tx.commit().await?;
        return Ok(false);
    };

    sqlx::query("DELETE FROM tokens WHERE token_id = $1")
        .bind(token_id)
        .execute(&mut *tx)
        .await?;

    // Escrow refunds to the buyer's spendable balance — sweep reclaims
    // unredeemed credits, it never destroys them.
    sqlx::query(
        "UPDATE principals SET balance = balance + $1, escrow_balance = GREATEST(escrow_balance - $1, 0) WHERE id = $2",
    )
    .bind(token.amount)
    .bind(&token.buyer_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Count a buyer's currently-live tokens — used by the `/invariants`
/// diagnostic endpoint to check invariant 1 from outside the database.
pub async fn count_live_for_buyer(pool: &PgPool, buyer_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM tokens WHERE buyer_id = $1")
        .bind(buyer_id)
        .fetch_one(pool)
        .await
}
