mod api;
mod config;
mod db;
mod error;
mod fallback;
mod fetcher;
mod roi;
mod scorer;
mod types;
mod validation;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::latency::LatencyStats;
use crate::api::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::CoreAgentsClient;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Upstream client ---
    if cfg.core_agents_secret_key.is_empty() {
        warn!("CORE_AGENTS_SECRET_KEY not set, upstream calls will be unauthenticated and are likely to fail");
    }
    let latency = Arc::new(LatencyStats::new());
    let core_agents = CoreAgentsClient::new(
        cfg.core_agents_url.clone(),
        cfg.core_agents_secret_key.clone(),
        cfg.upstream_timeout(),
        Arc::clone(&latency),
    )?;
    info!(
        url = %cfg.core_agents_url,
        timeout_secs = cfg.core_agents_timeout_secs,
        "Core Agents client ready"
    );

    // --- HTTP API server ---
    let api_state = ApiState::new(pool.clone(), Arc::new(core_agents), latency, cfg.cache_ttl());
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, closing database");
    pool.close().await;
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
