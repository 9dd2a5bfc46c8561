pub mod activation;
pub mod health;
pub mod sessions;
pub mod users;

pub use self::health::health;

// common functions for the handlers
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use axum::http::StatusCode;
use regex::Regex;
use serde_json::{json, Value};

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Reasons a proposed password fails the complexity policy; empty means it
/// passes.
pub fn password_complexity_problems(password: &str) -> Vec<&'static str> {
    let mut reasons = Vec::new();

    if password.len() < 8 {
        reasons.push("be 8 characters or more");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        reasons.push("include a number");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        reasons.push("include a capital letter");
    }

    reasons
}

/// Header carrying the user-supplied string value, if present.
pub fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

pub fn json_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// Repository or store failures surface as an opaque 500.
pub fn internal_error(err: &anyhow::Error) -> Response {
    tracing::error!("request failed: {err:#}");

    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": "Internal server error"}),
    )
}
