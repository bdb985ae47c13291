//! hub-gateway server entry point.
//!
//! Starts the Axum HTTP server with the device endpoint, the operator REST
//! API and the operator event stream.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use hub_gateway::app_state::AppState;
use hub_gateway::config::GatewayConfig;
use hub_gateway::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = GatewayConfig::from_env().context("loading configuration")?;
    tracing::info!(addr = %config.listen_addr, "starting hub-gateway");

    let state = AppState::from_config(&config);
    if state.operator_gate.is_open() {
        tracing::warn!("OPERATOR_TOKENS is empty, operator API is unauthenticated");
    }
    if config.device_tokens.is_empty() {
        tracing::warn!("DEVICE_TOKENS is empty, no hub can connect");
    }

    let sweeper = state.hub_service.spawn_timeout_sweeper(config.sweep_interval);
    let hub_service = Arc::clone(&state.hub_service);
    let app = server::build_app(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    server::serve(listener, app, async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for shutdown signal");
        }
        let closed = hub_service.shutdown().await;
        tracing::info!(closed, "shutting down");
    })
    .await
    .context("server error")?;

    sweeper.abort();
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
