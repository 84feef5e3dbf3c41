//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown

use tokio::sync::mpsc;

use crate::lifecycle::Shutdown;

/// Listen for OS signals until shutdown. SIGINT and SIGTERM trigger
/// `shutdown`; SIGHUP sends on `reload`.
#[cfg(unix)]
pub async fn handle_signals(shutdown: Shutdown, reload: mpsc::UnboundedSender<()>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(signal = "SIGINT", "Shutdown signal received");
                break;
            }
            _ = terminate.recv() => {
                tracing::info!(signal = "SIGTERM", "Shutdown signal received");
                break;
            }
            _ = hangup.recv() => {
                tracing::info!(signal = "SIGHUP", "Reload signal received");
                if reload.send(()).is_err() {
                    tracing::warn!("Reload requested but no reload handler is running");
                }
            }
            _ = shutdown.wait() => return Ok(()),
        }
    }

    shutdown.trigger();
    Ok(())
}

#[cfg(not(unix))]
pub async fn handle_signals(shutdown: Shutdown, _reload: mpsc::UnboundedSender<()>) -> std::io::Result<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!(signal = "ctrl-c", "Shutdown signal received");
            shutdown.trigger();
        }
        _ = shutdown.wait() => {}
    }
    Ok(())
}
