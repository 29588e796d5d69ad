//! HTTPS enforcement.
//!
//! Plaintext GET and HEAD requests are redirected to the same URL over
//! https; any other plaintext request is refused, since redirecting it would
//! silently drop the body.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, uri::Scheme, HeaderValue, Method, Request},
    middleware::Next,
    response::Response,
};

use crate::config::SecurityConfig;
use crate::http::response;
use crate::observability::metrics;

pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// When a request counts as secure.
#[derive(Debug, Clone)]
pub struct HttpsPolicy {
    pub enabled: bool,
    /// Honor `X-Forwarded-Proto` set by a TLS-terminating proxy.
    pub trust_proxy: bool,
}

impl HttpsPolicy {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            enabled: config.enforce_https,
            trust_proxy: config.trust_proxy,
        }
    }

    pub fn is_secure<B>(&self, request: &Request<B>) -> bool {
        if request.uri().scheme() == Some(&Scheme::HTTPS) {
            return true;
        }
        self.trust_proxy
            && request
                .headers()
                .get(X_FORWARDED_PROTO)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
    }
}

/// `https://` URL for the same host and path, if the host is known.
fn redirect_target<B>(request: &Request<B>) -> Option<HeaderValue> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))?;
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    HeaderValue::try_from(format!("https://{}{}", host, path)).ok()
}

/// Middleware redirecting or refusing plaintext traffic.
pub async fn https_middleware(
    State(policy): State<Arc<HttpsPolicy>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !policy.enabled || policy.is_secure(&request) {
        return next.run(request).await;
    }

    let method = request.method();
    if method != Method::GET && method != Method::HEAD {
        tracing::debug!(method = %method, path = %request.uri().path(), "Refusing plaintext request");
        metrics::record_https_rejected("forbidden");
        return response::https_required();
    }

    match redirect_target(&request) {
        Some(location) => {
            metrics::record_https_rejected("redirect");
            response::moved_permanently(location)
        }
        None => response::bad_request(response::MISSING_HOST),
    }
}
