//! Input sanitization.
//!
//! Neutralizes markup in client-controlled strings by escaping `<` as
//! `&lt;`. The stage in this module rewrites the query string; the body
//! parser reuses [`sanitize_json`] and [`sanitize_text`] once a body has been
//! decoded.

use std::borrow::Cow;

use axum::{
    body::Body,
    http::{uri::PathAndQuery, Request, Uri},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use url::form_urlencoded;

/// Escape every `<` in `input`. Borrows when nothing needs escaping.
pub fn sanitize_text(input: &str) -> Cow<'_, str> {
    if input.contains('<') {
        Cow::Owned(input.replace('<', "&lt;"))
    } else {
        Cow::Borrowed(input)
    }
}

/// Escape strings and object keys anywhere inside `value`.
/// Returns whether anything changed.
pub fn sanitize_json(value: &mut Value) -> bool {
    match value {
        Value::String(s) => {
            if s.contains('<') {
                *s = s.replace('<', "&lt;");
                true
            } else {
                false
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| sanitize_json(item) | changed),
        Value::Object(map) => {
            let mut changed = false;
            for (key, mut item) in std::mem::take(map) {
                changed |= sanitize_json(&mut item);
                let key = if key.contains('<') {
                    changed = true;
                    key.replace('<', "&lt;")
                } else {
                    key
                };
                map.insert(key, item);
            }
            changed
        }
        _ => false,
    }
}

/// Sanitize the pairs of an `application/x-www-form-urlencoded` string.
/// Returns the re-encoded string only when something changed.
pub fn sanitize_form(encoded: &[u8]) -> Option<String> {
    let mut changed = false;
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in form_urlencoded::parse(encoded) {
        let key = sanitize_text(&key);
        let value = sanitize_text(&value);
        changed |= matches!(key, Cow::Owned(_)) || matches!(value, Cow::Owned(_));
        serializer.append_pair(&key, &value);
    }
    changed.then(|| serializer.finish())
}

fn sanitize_uri(uri: &Uri) -> Option<Uri> {
    let clean = sanitize_form(uri.query()?.as_bytes())?;
    let path_and_query = PathAndQuery::try_from(format!("{}?{}", uri.path(), clean)).ok()?;

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).ok()
}

/// Middleware rewriting the query string with escaped values.
pub async fn sanitize_middleware(mut request: Request<Body>, next: Next) -> Response {
    if let Some(uri) = sanitize_uri(request.uri()) {
        tracing::debug!(path = %uri.path(), "Sanitized query string");
        *request.uri_mut() = uri;
    }
    next.run(request).await
}
