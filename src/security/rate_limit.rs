//! Fixed-window rate limiting middleware.
//!
//! Every client key gets a counter and a window start. A window is reset
//! lazily by the first request that arrives after it expired, and stale
//! counters are dropped by [`FixedWindowLimiter::sweep`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::http::response;
use crate::observability::metrics;

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Key used when the peer address is unknown.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Counter for a single client key.
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u32,
    window_start: Instant,
}

impl WindowCounter {
    fn expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time left in the current window.
    pub reset_after: Duration,
}

impl Decision {
    /// Time left until the window resets, rounded up to whole seconds.
    pub fn reset_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(self.reset_after_secs()));
    }
}

/// Per-key fixed-window counter table.
pub struct FixedWindowLimiter {
    counters: DashMap<String, WindowCounter>,
    max_requests: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            counters: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a request from `key` at `now` and decide whether it is admitted.
    ///
    /// The entry lock is held for the whole check-and-increment, so concurrent
    /// requests from one key are serialized.
    pub fn admit(&self, key: &str, now: Instant) -> Decision {
        let mut counter = self
            .counters
            .entry(key.to_owned())
            .or_insert(WindowCounter {
                count: 0,
                window_start: now,
            });

        if counter.expired(now, self.window) {
            counter.count = 0;
            counter.window_start = now;
        }

        let allowed = counter.count < self.max_requests;
        if allowed {
            counter.count += 1;
        }

        Decision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(counter.count),
            reset_after: self
                .window
                .saturating_sub(now.saturating_duration_since(counter.window_start)),
        }
    }

    /// Requests counted for `key` in its current window.
    pub fn hits(&self, key: &str) -> Option<u32> {
        self.counters.get(key).map(|c| c.count)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop every counter whose window has expired. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, c| !c.expired(now, self.window));
        before.saturating_sub(self.counters.len())
    }
}

/// State for the rate limiting stage.
pub struct RateLimiterState {
    pub limiter: FixedWindowLimiter,
    message: String,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limiter: FixedWindowLimiter::from_config(config),
            message: config.message(),
        }
    }

    /// Body sent with 429 responses.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Client key for a request: the peer IP when connection info is present.
pub fn client_key(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Middleware function for fixed-window rate limiting.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&request);
    let now = Instant::now();
    let decision = state.limiter.admit(&key, now);

    if !decision.allowed {
        tracing::warn!(client = %key, limit = decision.limit, "Rate limit exceeded");
        metrics::record_rate_limited();
        let retry_after = decision.reset_after_secs();
        let mut response = response::too_many_requests(state.message(), retry_after);
        decision.write_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    decision.write_headers(response.headers_mut());
    response
}
