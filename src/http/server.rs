//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router for the application (a 404 fallback by default)
//! - Wire up the admission pipeline and transport layers (tracing, timeout,
//!   request ID)
//! - Serve on a bound listener with graceful shutdown
//! - Sweep expired rate-limit counters in the background

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{body::Body, http::Request, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatekeeperConfig;
use crate::http::pipeline::{Pipeline, STAGES};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::http::response;
use crate::observability::metrics;
use crate::resilience::LagSource;
use crate::security::RateLimiterState;

/// HTTP server wrapping an application in the admission pipeline.
pub struct HttpServer {
    router: Router,
    config: GatekeeperConfig,
    pipeline: Pipeline,
}

impl HttpServer {
    /// Create a server with no application routes.
    pub fn new(config: GatekeeperConfig, lag: Arc<dyn LagSource>) -> Self {
        Self::with_app(config, lag, Router::new().fallback(response::not_found))
    }

    /// Create a server running `app` behind the pipeline.
    pub fn with_app(config: GatekeeperConfig, lag: Arc<dyn LagSource>, app: Router) -> Self {
        let pipeline = Pipeline::new(&config, lag);
        let router = Self::build_router(&config, &pipeline, app);

        tracing::debug!(stages = ?STAGES, "Pipeline assembled");

        Self {
            router,
            config,
            pipeline,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatekeeperConfig, pipeline: &Pipeline, app: Router) -> Router {
        pipeline
            .wrap(app)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = request.request_id().unwrap_or("-"),
                    )
                }),
            )
            .layer(set_request_id_layer())
    }

    /// The fully layered router, e.g. for driving requests in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if self.config.rate_limit.enabled {
            let sweep_every = Duration::from_secs(self.config.rate_limit.sweep_interval_secs);
            tokio::spawn(sweep_counters(
                self.pipeline.rate_limiter().clone(),
                sweep_every,
                shutdown.resubscribe(),
            ));
        }

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Periodically drop rate-limit counters whose window has expired.
async fn sweep_counters(
    state: Arc<RateLimiterState>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                let removed = state.limiter.sweep(Instant::now());
                let remaining = state.limiter.len();
                metrics::record_tracked_keys(remaining);
                if removed > 0 {
                    tracing::debug!(removed, remaining, "Swept expired rate-limit counters");
                }
            }
        }
    }
}
