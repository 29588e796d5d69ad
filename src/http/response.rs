//! Fixed responses written by stages that terminate a request.
//!
//! All rejection bodies are plain text; no structured error codes are
//! surfaced to clients beyond the status and message.

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

/// Body of every overload rejection.
pub const SERVER_TOO_BUSY: &str = "Server too busy!";

/// Body of the 403 sent to plaintext non-GET requests.
pub const HTTPS_REQUIRED: &str = "Please use HTTPS when submitting data to this server.";

pub const PAYLOAD_TOO_LARGE: &str = "request entity too large";

pub const INVALID_JSON: &str = "invalid JSON body";

pub const UNREADABLE_BODY: &str = "failed to read request body";

pub const MISSING_HOST: &str = "missing Host header";

fn text(status: StatusCode, body: impl Into<Body>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// 429 with the configured limit message and a `Retry-After` hint.
pub fn too_many_requests(message: &str, retry_after_secs: u64) -> Response {
    let mut response = text(StatusCode::TOO_MANY_REQUESTS, message.to_owned());
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

pub fn service_unavailable() -> Response {
    text(StatusCode::SERVICE_UNAVAILABLE, SERVER_TOO_BUSY)
}

pub fn payload_too_large() -> Response {
    text(StatusCode::PAYLOAD_TOO_LARGE, PAYLOAD_TOO_LARGE)
}

pub fn bad_request(message: &'static str) -> Response {
    text(StatusCode::BAD_REQUEST, message)
}

pub fn https_required() -> Response {
    text(StatusCode::FORBIDDEN, HTTPS_REQUIRED)
}

/// Permanent redirect to `location`.
pub fn moved_permanently(location: HeaderValue) -> Response {
    let mut response = text(StatusCode::MOVED_PERMANENTLY, Body::empty());
    response.headers_mut().insert(header::LOCATION, location);
    response
}

/// Response for requests that reach the end of the pipeline with no
/// application attached.
pub async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    text(
        StatusCode::NOT_FOUND,
        format!("Cannot {} {}", method, uri.path()),
    )
}
