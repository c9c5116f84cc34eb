mod api;
mod assembler;
mod config;
mod error;
mod history;
mod provider;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::provider::YahooClient;

#[tokio::main]
async fn main() {
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
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new(cfg.upstream_timeout_secs));

    let provider = YahooClient::new(&cfg, Arc::clone(&health), Arc::clone(&latency))?;
    info!(
        "Upstream provider: {} (timeout {}s, latency ceiling {}ms)",
        cfg.yahoo_base_url,
        cfg.upstream_timeout_secs,
        latency.ceiling_us() / 1_000
    );
    info!(
        "Validity gate: {} | windowed history shape: {}",
        cfg.validity_gate, cfg.bar_shape
    );

    let api_state = ApiState {
        provider: Arc::new(provider),
        gate: cfg.validity_gate,
        bar_shape: cfg.bar_shape,
        health,
        latency,
    };
    let app = router(api_state);

    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
