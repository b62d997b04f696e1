//! Signal handling for graceful shutdown.

use tokio::signal::unix::{SignalKind, signal};

/// Completes when a shutdown signal is received.
///
/// Listens for SIGTERM, SIGINT (Ctrl+C) and SIGHUP. The bot has nothing to
/// reload, so a hangup stops it like the other two.
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
        _ = sighup.recv() => {
            tracing::info!("Received SIGHUP, initiating graceful shutdown");
        }
    }
    Ok(())
}

/// Wait for a shutdown signal, falling back to Ctrl+C if the unix handlers
/// cannot be installed.
pub async fn wait_for_shutdown() {
    if let Err(e) = shutdown_signal().await {
        tracing::error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
