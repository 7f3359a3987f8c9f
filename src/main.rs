use nexus_broker::config::Config;
use nexus_broker::routes::{
    health_routes, invariants_routes, mint_routes, settle_routes, sweep_routes,
};
use nexus_broker::{db, scheduler, AppState};

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nexus_broker=debug".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "invalid configuration");
        std::process::exit(1);
    });

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Running migrations...");
    db::run_migrations(&pool).await?;

    scheduler::spawn_sweep_task(pool.clone(), config.sweep_interval_seconds, config.sweep_max_limit);

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        pool,
        config: Arc::new(config),
    };

    let app = Router::new()
        .merge(health_routes())
        .merge(mint_routes())
        .merge(settle_routes())
        .merge(sweep_routes())
        .merge(invariants_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Nexus broker listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
