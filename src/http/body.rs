//! Request body parsing.
//!
//! JSON and urlencoded bodies are buffered up to the configured limit,
//! decoded, sanitized and handed on. The decoded form is attached to the
//! request as a [`ParsedBody`] extension; the raw bytes stay available to
//! the application. Other content types are not touched.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use http_body_util::LengthLimitError;
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::http::response;
use crate::security::sanitize::{sanitize_form, sanitize_json};

/// Decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

/// Maximum number of body bytes the parser will buffer.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimit(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = content_type.split(';').next()?.trim();
    if essence.eq_ignore_ascii_case("application/json") {
        Some(BodyKind::Json)
    } else if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        Some(BodyKind::Form)
    } else {
        None
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Form pairs as a JSON object; repeated keys collect into an array.
fn form_to_value(encoded: &[u8]) -> Value {
    let mut map = Map::new();
    for (key, value) in form_urlencoded::parse(encoded) {
        let value = Value::String(value.into_owned());
        match map.get_mut(&*key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(map)
}

/// Decode and sanitize `bytes`. Returns the parsed value and, when
/// sanitization changed anything, replacement bytes.
fn decode(kind: BodyKind, bytes: &Bytes) -> Result<(Value, Option<Bytes>), &'static str> {
    match kind {
        BodyKind::Json => {
            let mut value: Value =
                serde_json::from_slice(bytes).map_err(|_| response::INVALID_JSON)?;
            let rewritten = if sanitize_json(&mut value) {
                let encoded = serde_json::to_vec(&value).map_err(|_| response::INVALID_JSON)?;
                Some(Bytes::from(encoded))
            } else {
                None
            };
            Ok((value, rewritten))
        }
        BodyKind::Form => {
            let rewritten = sanitize_form(bytes).map(Bytes::from);
            let value = form_to_value(rewritten.as_deref().unwrap_or(&bytes[..]));
            Ok((value, rewritten))
        }
    }
}

/// Middleware buffering and decoding JSON / form bodies.
pub async fn parse_body_middleware(
    State(limit): State<BodyLimit>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(kind) = body_kind(request.headers()) else {
        return next.run(request).await;
    };

    if declared_length(request.headers()).is_some_and(|len| len > limit.0) {
        tracing::debug!(limit = limit.0, "Declared body length over limit");
        return response::payload_too_large();
    }

    let (mut parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, limit.0).await {
        Ok(bytes) => bytes,
        Err(e) if is_length_limit(&e) => {
            tracing::debug!(limit = limit.0, "Body over limit");
            return response::payload_too_large();
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read request body");
            return response::bad_request(response::UNREADABLE_BODY);
        }
    };

    if bytes.is_empty() {
        return next.run(Request::from_parts(parts, Body::empty())).await;
    }

    let bytes = match decode(kind, &bytes) {
        Ok((value, rewritten)) => {
            parts.extensions.insert(ParsedBody(value));
            rewritten.unwrap_or(bytes)
        }
        Err(message) => {
            tracing::debug!(kind = ?kind, "Rejecting malformed body");
            return response::bad_request(message);
        }
    };

    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
