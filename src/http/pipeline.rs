//! Fixed middleware pipeline.
//!
//! Requests pass through the stages in [`STAGES`] order. Any stage may end
//! the request by writing a response, in which case no later stage and no
//! application handler runs. The order is fixed when the pipeline is built.

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state, map_response},
    Router,
};
use tower_http::compression::{
    predicate::{NotForContentType, Predicate, SizeAbove},
    CompressionLayer,
};

use crate::config::GatekeeperConfig;
use crate::http::body::{parse_body_middleware, BodyLimit};
use crate::resilience::{shedding::overload_middleware, LagSource, OverloadGate};
use crate::security::{
    cors::cors_layer,
    headers::set_security_headers,
    https::{https_middleware, HttpsPolicy},
    rate_limit::{rate_limit_middleware, RateLimiterState},
    sanitize::sanitize_middleware,
};

/// Stage names, outermost first.
pub const STAGES: [&str; 8] = [
    "cors",
    "sanitize",
    "parse-body",
    "compress",
    "security-headers",
    "rate-limit",
    "overload-shed",
    "https-enforce",
];

/// Shared state for every stage, owned by the server.
#[derive(Clone)]
pub struct Pipeline {
    rate_limiter: Arc<RateLimiterState>,
    rate_limit_enabled: bool,
    gate: Arc<OverloadGate>,
    https: Arc<HttpsPolicy>,
    body_limit: BodyLimit,
    compression_min_bytes: u16,
}

impl Pipeline {
    pub fn new(config: &GatekeeperConfig, lag: Arc<dyn LagSource>) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiterState::new(&config.rate_limit)),
            rate_limit_enabled: config.rate_limit.enabled,
            gate: Arc::new(OverloadGate::from_config(lag, &config.overload)),
            https: Arc::new(HttpsPolicy::from_config(&config.security)),
            body_limit: BodyLimit(config.security.body_limit_bytes),
            compression_min_bytes: config.security.compression_min_bytes,
        }
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiterState> {
        &self.rate_limiter
    }

    pub fn gate(&self) -> &Arc<OverloadGate> {
        &self.gate
    }

    /// Wrap `app` in every stage.
    ///
    /// `Router::layer` makes the last added layer the outermost, so stages are
    /// added innermost first.
    pub fn wrap(&self, app: Router) -> Router {
        let compression = CompressionLayer::new().compress_when(
            SizeAbove::new(self.compression_min_bytes)
                .and(NotForContentType::GRPC)
                .and(NotForContentType::IMAGES)
                .and(NotForContentType::SSE),
        );

        let mut router = app
            .layer(from_fn_with_state(self.https.clone(), https_middleware))
            .layer(from_fn_with_state(self.gate.clone(), overload_middleware));

        if self.rate_limit_enabled {
            router = router.layer(from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ));
        }

        router
            .layer(map_response(set_security_headers))
            .layer(compression)
            .layer(from_fn_with_state(self.body_limit, parse_body_middleware))
            .layer(from_fn(sanitize_middleware))
            .layer(cors_layer())
    }
}
