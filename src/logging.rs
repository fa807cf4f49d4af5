//! Middleware for logging requests and responses.

use axum::{
    body::{Body, HttpBody, to_bytes},
    extract::Request,
    http::{StatusCode, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

/// Bodies longer than this many bytes are truncated in the `info` logs.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

/// Bodies that may be larger than this many bytes are passed through without
/// being buffered or logged.
pub const MAX_LOGGED_BODY_SIZE: usize = 64 * 1024;

/// The JSON fields whose values are never logged.
const REDACTED_FIELDS: [&str; 2] = ["password", "access_token"];

const UNLOGGED_BODY: &str = "<not logged>";

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If a body is longer than [LOG_BODY_LENGTH_LIMIT] bytes, it is
/// truncated and the full body is logged at the `debug` level.
/// Passwords and tokens in JSON bodies are replaced with asterisks.
///
/// Only bodies known to be at most [MAX_LOGGED_BODY_SIZE] bytes are read,
/// anything else is streamed through untouched.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let body = if is_loggable(&body) {
        let body_bytes = match to_bytes(body, MAX_LOGGED_BODY_SIZE).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!("Could not read request body: {error}");
                return StatusCode::BAD_REQUEST.into_response();
            }
        };
        let is_json = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));
        let body_text = String::from_utf8_lossy(&body_bytes);
        let display_text = if is_json {
            redact_json(&body_text)
        } else {
            body_text.to_string()
        };
        log_request(&parts, &display_text);

        Body::from(body_bytes)
    } else {
        log_request(&parts, UNLOGGED_BODY);
        body
    };

    let response = next.run(Request::from_parts(parts, body)).await;

    let (parts, body) = response.into_parts();
    if !is_loggable(&body) {
        log_response(&parts, UNLOGGED_BODY);
        return Response::from_parts(parts, body);
    }

    let body_bytes = match to_bytes(body, MAX_LOGGED_BODY_SIZE).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!("Could not read response body: {error}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    log_response(&parts, &redact_json(&String::from_utf8_lossy(&body_bytes)));

    Response::from_parts(parts, Body::from(body_bytes))
}

/// Whether `body` is known to be small enough to buffer for logging.
fn is_loggable(body: &Body) -> bool {
    body.size_hint()
        .upper()
        .is_some_and(|upper| upper <= MAX_LOGGED_BODY_SIZE as u64)
}

/// Replace the values of sensitive fields anywhere in a JSON document.
///
/// Text that is not valid JSON is returned unchanged.
fn redact_json(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(mut value) => {
            redact_value(&mut value);
            value.to_string()
        }
        Err(_) => text.to_owned(),
    }
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if REDACTED_FIELDS.contains(&key.as_str()) {
                    *field = Value::String("********".to_owned());
                } else {
                    redact_value(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}

fn truncate(body: &str) -> &str {
    let mut end = LOG_BODY_LENGTH_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }

    &body[..end]
}

fn log_request(parts: &axum::http::request::Parts, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Received request: {} {}\nbody: {}...",
            parts.method,
            parts.uri,
            truncate(body)
        );
        tracing::debug!("Full request body: {body:?}");
    } else {
        tracing::info!(
            "Received request: {} {}\nbody: {body:?}",
            parts.method,
            parts.uri
        );
    }
}

fn log_response(parts: &axum::http::response::Parts, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Sending response: {}\nbody: {}...",
            parts.status,
            truncate(body)
        );
        tracing::debug!("Full response body: {body:?}");
    } else {
        tracing::info!("Sending response: {}\nbody: {body:?}", parts.status);
    }
}
