//! Rate-limit classification of API responses.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpResponse;

pub const DEFAULT_RATE_LIMIT_MESSAGE: &str = "API rate limit exceeded.";

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// The upstream API refused the request because the quota is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RateLimitError {
    pub message: String,
    /// Whether the client was configured with a credential.
    pub has_token: bool,
    pub reset_at: Option<DateTime<Utc>>,
}

/// 429 always counts; 403 only when the remaining quota header is present
/// and parses to zero or less.
pub(crate) fn is_rate_limited(response: &HttpResponse) -> bool {
    match response.status {
        429 => true,
        403 => response
            .header(REMAINING_HEADER)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .is_some_and(|remaining| remaining <= 0),
        _ => false,
    }
}

pub(crate) fn reset_at(response: &HttpResponse) -> Option<DateTime<Utc>> {
    let secs = response.header(RESET_HEADER)?.trim().parse::<i64>().ok()?;
    DateTime::from_timestamp(secs, 0)
}

fn error_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
}

pub(crate) fn classify(response: &HttpResponse, has_token: bool) -> Option<RateLimitError> {
    if !is_rate_limited(response) {
        return None;
    }
    Some(RateLimitError {
        message: error_message(&response.body)
            .unwrap_or_else(|| DEFAULT_RATE_LIMIT_MESSAGE.to_string()),
        has_token,
        reset_at: reset_at(response),
    })
}
