//! Startup orchestration.
//!
//! # Responsibilities
//! - Start background tasks (lag monitor, metrics exporter)
//! - Build the server and bind its listener
//! - Keep the process alive in a degraded state when startup fails
//!
//! # Design Decisions
//! - Bootstrap failures are logged, never fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::{GatekeeperConfig, ListenerConfig};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::LagMonitor;

/// Error type for startup operations.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Bind the configured listener address.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, StartupError> {
    let address = config.bind_address();
    TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })
}

/// Observer registered on the lag monitor.
pub fn log_lag(lag: Duration) {
    let lag_ms = lag.as_millis() as u64;
    tracing::warn!(lag_ms, "Event loop lag detected! Latency: {}ms", lag_ms);
}

fn start_metrics(config: &GatekeeperConfig) {
    let Some(address) = config.observability.metrics_address.as_deref() else {
        return;
    };
    match address.parse::<SocketAddr>() {
        Ok(addr) => metrics::init_metrics(addr),
        Err(e) => tracing::error!(
            metrics_address = %address,
            error = %e,
            "Failed to parse metrics address"
        ),
    }
}

/// Start every subsystem and serve until `shutdown` fires.
///
/// Never returns an error: a bind failure is logged and the process idles
/// until it is signalled.
pub async fn run(config: GatekeeperConfig, shutdown: &Shutdown) {
    let mut stop = shutdown.subscribe();

    start_metrics(&config);

    let monitor = LagMonitor::new(&config.overload);
    monitor.on_lag(log_lag);
    let sampler = monitor.start(shutdown.subscribe());

    let listener_config = config.listener.clone();
    let server = HttpServer::new(config, monitor.source());

    match bind(&listener_config).await {
        Ok(listener) => {
            let port = listener
                .local_addr()
                .map(|addr| addr.port())
                .unwrap_or(listener_config.port);
            tracing::info!(port, "Connected successfully on port {}", port);

            if let Err(e) = server.run(listener, stop).await {
                tracing::error!(error = %e, "HTTP server failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Error occurred: {}", e);
            wait_degraded(&mut stop).await;
        }
    }

    shutdown.trigger();
    if let Err(e) = sampler.await {
        tracing::debug!(error = %e, "Lag monitor task ended abnormally");
    }
}

/// Idle without a listener until shutdown.
pub async fn wait_degraded(stop: &mut broadcast::Receiver<()>) {
    tracing::warn!("Running without a listening socket until shutdown");
    let _ = stop.recv().await;
}
