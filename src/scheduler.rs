use chrono::Utc;
use sqlx::PgPool;
use std::time::Duration;

use crate::models::token::sweep_batch;

/// Spawns a background task that runs Sweep on a fixed interval, so
/// stranded escrow is reclaimed even if no operator ever calls
/// `/sweep_expired`.
pub fn spawn_sweep_task(pool: PgPool, interval_seconds: u64, limit: i64) {
    tokio::spawn(async move {
        tracing::info!(
            interval_seconds,
            limit,
            "sweep scheduler started"
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            ticker.tick().await;

            match sweep_batch(&pool, Utc::now(), limit).await {
                Ok(swept) if swept > 0 => {
                    tracing::info!(swept, "scheduled sweep reclaimed expired tokens");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "scheduled sweep failed");
                }
            }
        }
    });
}
