//! Cross-origin policy.
//!
//! Every origin is allowed. Pre-flight requests are answered directly with
//! 200 and never reach later stages.

use axum::http::Method;
use tower_http::cors::{AllowHeaders, Any, CorsLayer};

/// CORS layer allowing all origins.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers(AllowHeaders::mirror_request())
}
