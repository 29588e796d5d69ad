//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gatekeeper_rate_limited_total` (counter): requests rejected with 429
//! - `gatekeeper_shed_total` (counter): requests rejected with 503
//! - `gatekeeper_https_rejected_total` (counter): plaintext requests, by action
//! - `gatekeeper_event_loop_lag_ms` (gauge): latest smoothed lag sample
//! - `gatekeeper_rate_limit_keys` (gauge): tracked client keys after a sweep
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rate_limited() {
    metrics::counter!("gatekeeper_rate_limited_total").increment(1);
}

pub fn record_shed() {
    metrics::counter!("gatekeeper_shed_total").increment(1);
}

pub fn record_https_rejected(action: &'static str) {
    metrics::counter!("gatekeeper_https_rejected_total", "action" => action).increment(1);
}

pub fn record_lag(lag_ms: f64) {
    metrics::gauge!("gatekeeper_event_loop_lag_ms").set(lag_ms);
}

pub fn record_tracked_keys(count: usize) {
    metrics::gauge!("gatekeeper_rate_limit_keys").set(count as f64);
}
