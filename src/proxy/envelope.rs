//! GraphQL error envelopes.

use reqwest::StatusCode;
use serde_json::{json, Value};

/// `extensions.code` values that mean the caller is not authenticated.
pub const AUTH_FAILURE_CODES: [&str; 5] = [
    "UNAUTHENTICATED",
    "UNAUTHORIZED",
    "FORBIDDEN",
    "INVALID_TOKEN",
    "TOKEN_EXPIRED",
];

/// True when the backend rejected the credentials, either through the HTTP
/// status or through a GraphQL error code.
#[must_use]
pub fn is_auth_failure(status: StatusCode, body: Option<&Value>) -> bool {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return true;
    }

    body.and_then(|body| body.get("errors"))
        .and_then(Value::as_array)
        .is_some_and(|errors| {
            errors.iter().any(|error| {
                error
                    .pointer("/extensions/code")
                    .and_then(Value::as_str)
                    .is_some_and(|code| AUTH_FAILURE_CODES.contains(&code))
            })
        })
}

#[must_use]
pub fn error_envelope(message: &str, code: &str) -> Value {
    json!({
        "errors": [{
            "message": message,
            "extensions": { "code": code },
        }]
    })
}
