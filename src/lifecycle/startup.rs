//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the gateway from a validated configuration
//! - Start background tasks (metrics, bucket sweeper, config reload)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::admin::{self, AdminState};
use crate::config::{load_config, ConfigWatcher, GatewayConfig};
use crate::gateway::Gateway;
use crate::security::IssuerConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{metrics, NullSink, RecordSink, TracingSink};

/// Run the gateway until a shutdown signal arrives.
pub async fn run(config: GatewayConfig, config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let sink: Arc<dyn RecordSink> = if config.observability.dispatch_records {
        Arc::new(TracingSink)
    } else {
        Arc::new(NullSink)
    };
    let gateway = Gateway::from_config(&config, sink).map_err(|errors| {
        let joined = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        format!("invalid configuration: {joined}")
    })?;
    let gateway = Arc::new(gateway);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        policies = config.policies.len(),
        trailing_wildcard = ?config.matching.trailing_wildcard,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();

    spawn_sweeper(
        gateway.clone(),
        Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1)),
        shutdown.clone(),
    );

    let (reload_tx, reload_rx) = mpsc::unbounded_channel();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = signals::handle_signals(shutdown, reload_tx).await {
                tracing::error!(error = %e, "Signal handler failed");
            }
        }
    });

    // Keep the watcher handle alive until the server stops.
    let _watcher = match &config_path {
        Some(path) => spawn_reloader(
            gateway.clone(),
            path,
            config.issuers.clone(),
            reload_rx,
            shutdown.clone(),
        ),
        None => None,
    };

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(gateway.clone(), &config.admin.api_key);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, shutdown).await {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(gateway, &config.listener);
    server.run(listener, shutdown.clone()).await?;

    shutdown.trigger();
    Ok(())
}

/// Periodically evict idle rate-limit buckets.
pub fn spawn_sweeper(gateway: Arc<Gateway>, interval: Duration, shutdown: Shutdown) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    gateway.evict_idle(Instant::now());
                }
                _ = shutdown.wait() => break,
            }
        }
        tracing::debug!("Rate-limit sweeper stopped");
    });
}

/// Apply config file changes (file watcher) and SIGHUP reloads.
fn spawn_reloader(
    gateway: Arc<Gateway>,
    path: &Path,
    issuers: Vec<IssuerConfig>,
    mut reload_rx: mpsc::UnboundedReceiver<()>,
    shutdown: Shutdown,
) -> Option<notify::RecommendedWatcher> {
    let (watcher, mut updates) = ConfigWatcher::new(path);
    let handle = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable; reload on SIGHUP only");
            None
        }
    };

    let path = path.to_path_buf();
    tokio::spawn(async move {
        loop {
            let config = tokio::select! {
                Some(config) = updates.recv() => config,
                Some(()) = reload_rx.recv() => match load_config(&path) {
                    Ok(config) => config,
                    Err(e) => {
                        metrics::record_config_reload(false);
                        tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                        continue;
                    }
                },
                _ = shutdown.wait() => break,
            };
            if config.issuers != issuers {
                tracing::warn!("Issuer table changed; restart to apply");
            }
            match gateway.apply_config(&config) {
                Ok(()) => tracing::info!("Configuration reloaded"),
                Err(errors) => {
                    for error in errors {
                        tracing::error!(field = %error.field, message = %error.message, "Rejected reloaded config");
                    }
                }
            }
        }
    });

    handle
}
