//! Status and transport classification shared by every dialect

use crate::providers::error::{retry_hint_from_secs, Failure, FailureKind, MAX_RETRY_HINT};
use serde_json::Value;
use std::time::Duration;

/// Longest error detail kept from a response body
const MAX_DETAIL_CHARS: usize = 300;

/// Classify a non-2xx status.
///
/// 401/403 are auth failures, 429 is rate limiting, 408 and 5xx are
/// transport failures, and any other 4xx is a rejection of this request.
pub fn classify_status(status: u16, body: &str) -> Failure {
    let detail = format!("HTTP {}: {}", status, extract_error_message(body));
    let kind = match status {
        401 | 403 => FailureKind::Auth,
        429 => FailureKind::RateLimited,
        408 | 500..=599 => FailureKind::Transport,
        400..=499 => FailureKind::Rejected,
        // 1xx/3xx reaching here means the backend did not answer the call
        _ => FailureKind::BadResponse,
    };
    Failure::new(kind, detail)
}

/// Classify a transport-level error from reqwest
pub fn classify_transport(error: &reqwest::Error) -> Failure {
    if error.is_timeout() {
        Failure {
            timed_out: true,
            ..Failure::transport(format!("request timed out: {}", error))
        }
    } else if error.is_connect() {
        Failure::transport(format!("connection failed: {}", error))
    } else if error.is_decode() || error.is_body() {
        Failure::transport(format!("failed to read response body: {}", error))
    } else {
        Failure::transport(error.to_string())
    }
}

/// Pull a human-readable message out of common error envelopes
fn extract_error_message(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            // OpenAI-style: {"error": {"message": ...}}
            json.pointer("/error/message")
                .and_then(Value::as_str)
                // Cloudflare: {"errors": [{"message": ...}]}
                .or_else(|| json.pointer("/errors/0/message").and_then(Value::as_str))
                // Generic: {"message": ...} or {"error": "..."}
                .or_else(|| json.get("message").and_then(Value::as_str))
                .or_else(|| json.get("error").and_then(Value::as_str))
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    if message.is_empty() {
        return "empty body".to_string();
    }
    if message.chars().count() > MAX_DETAIL_CHARS {
        let cut: String = message.chars().take(MAX_DETAIL_CHARS).collect();
        format!("{}...", cut)
    } else {
        message
    }
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
///
/// Values are capped at `MAX_RETRY_HINT`.
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let trimmed = header_value.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(seconds).min(MAX_RETRY_HINT));
    }
    trimmed.parse::<f64>().ok().and_then(retry_hint_from_secs)
}
