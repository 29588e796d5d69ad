//! Gatekeeper server (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                 GATEKEEPER                    │
//!   Client Request     │                                               │
//!   ───────────────────┼─▶ request id → trace → timeout                │
//!                      │        │                                      │
//!                      │        ▼                                      │
//!                      │   cors → sanitize → parse body → compress     │
//!                      │        → security headers → rate limit        │
//!                      │        → overload shed → https enforce        │
//!                      │        │                                      │
//!                      │        ▼                                      │
//!   Client Response    │   application (404 fallback)                  │
//!   ◀──────────────────┼────────┘                                      │
//!                      │                                               │
//!                      │  background: lag monitor, counter sweeper     │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use gatekeeper::config::{self, LoadOptions, LogFormat};
use gatekeeper::lifecycle::{signals, startup, Shutdown};
use gatekeeper::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(about = "HTTP server bootstrap with rate limiting and load shedding", long_about = None)]
struct Cli {
    /// Environment name; selects `.env.<ENV>` (overrides APP_ENV).
    #[arg(short, long)]
    env: Option<String>,

    /// Directory holding the `.env.*` files (overrides CONFIG_DIR).
    #[arg(short, long)]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let options = LoadOptions {
        app_env: cli.env,
        config_dir: cli.config_dir,
    };

    let loaded = config::load_from_env(&options);
    let log_format = loaded
        .as_ref()
        .map(|c| c.observability.log_format)
        .unwrap_or(LogFormat::Pretty);
    init_logging(log_format);

    tracing::info!("gatekeeper v{} starting", env!("CARGO_PKG_VERSION"));

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    match loaded {
        Ok(config) => {
            tracing::info!(
                bind_address = %config.listener.bind_address(),
                rate_limit_max = config.rate_limit.max_requests,
                rate_limit_window_secs = config.rate_limit.window_secs,
                max_lag_ms = config.overload.max_lag_ms,
                enforce_https = config.security.enforce_https,
                "Configuration loaded"
            );
            startup::run(config, &shutdown).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Error occurred: {}", e);
            let mut stop = shutdown.subscribe();
            startup::wait_degraded(&mut stop).await;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
