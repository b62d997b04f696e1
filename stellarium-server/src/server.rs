//! Diagnostics endpoint.

use crate::state::AppState;
use axum::extract::State;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::net::SocketAddr;
use stellarium_core::utils::shutdown_requested;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, PartialEq, Eq, Serialize, serde::Deserialize)]
struct StatsResponse {
    uptime_seconds: u64,
    subscribers: usize,
    accounts: usize,
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let (subscribers, accounts) = state.registry.count().await;
    Json(StatsResponse {
        uptime_seconds: state.started_at.elapsed().as_secs(),
        subscribers,
        accounts,
    })
}

/// Serve `router` on `addr` until shutdown is requested.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Diagnostics endpoint listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown_requested(&mut shutdown_rx).await })
        .await
}
