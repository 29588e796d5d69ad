//! Load shedding based on event-loop lag.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::config::OverloadConfig;
use crate::http::response;
use crate::observability::metrics;
use crate::resilience::lag::LagSource;

/// Decides per request whether the process is too busy to take more work.
pub struct OverloadGate {
    source: Arc<dyn LagSource>,
    max_lag: Duration,
    enabled: bool,
}

impl OverloadGate {
    pub fn new(source: Arc<dyn LagSource>, max_lag: Duration) -> Self {
        Self {
            source,
            max_lag,
            enabled: true,
        }
    }

    pub fn from_config(source: Arc<dyn LagSource>, config: &OverloadConfig) -> Self {
        Self {
            source,
            max_lag: config.max_lag(),
            enabled: config.enabled,
        }
    }

    pub fn max_lag(&self) -> Duration {
        self.max_lag
    }

    /// True when the current lag is above the busy threshold.
    ///
    /// Fails open: a source with no measurement never sheds.
    pub fn should_shed(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.source.current_lag() {
            Some(lag) => lag > self.max_lag,
            None => {
                tracing::debug!("Lag source unavailable, admitting request");
                false
            }
        }
    }
}

/// Middleware function rejecting requests with 503 while overloaded.
pub async fn overload_middleware(
    State(gate): State<Arc<OverloadGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if gate.should_shed() {
        tracing::warn!(
            path = %request.uri().path(),
            max_lag_ms = gate.max_lag.as_millis() as u64,
            "Shedding request, server too busy"
        );
        metrics::record_shed();
        return response::service_unavailable();
    }

    next.run(request).await
}
