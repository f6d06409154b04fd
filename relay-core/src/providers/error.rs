//! Failure taxonomy and caller-facing errors

use crate::config::ConfigError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for gateway resolutions
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Longest wait honoured from a backend-supplied retry or reset hint
pub const MAX_RETRY_HINT: Duration = Duration::from_secs(24 * 60 * 60);

/// Turn a backend-supplied number of seconds into a hint, capped at `MAX_RETRY_HINT`.
///
/// Negative, NaN and infinite values are ignored.
pub fn retry_hint_from_secs(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(seconds).map_or(MAX_RETRY_HINT, |d| d.min(MAX_RETRY_HINT)))
}

/// Why a single attempt against one backend failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Connection error, timeout, 408 or 5xx
    Transport,
    /// The backend answered 429
    RateLimited,
    /// 401/403 or a required credential is missing
    Auth,
    /// 2xx with a body that could not be used
    BadResponse,
    /// Any other 4xx
    Rejected,
    /// Refused locally because the backend's own budget is exhausted
    Throttled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::RateLimited => "rate-limited",
            FailureKind::Auth => "auth",
            FailureKind::BadResponse => "bad-response",
            FailureKind::Rejected => "rejected",
            FailureKind::Throttled => "throttled",
        }
    }

    /// Auth failures do not heal without operator action
    pub fn is_fatal(&self) -> bool {
        matches!(self, FailureKind::Auth)
    }

    /// Whether the failure says anything about the backend's health
    pub fn counts_against_health(&self) -> bool {
        !matches!(self, FailureKind::Throttled)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified attempt failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
    /// `Retry-After` hint from the backend
    pub retry_after: Option<Duration>,
    /// The attempt ran out of its per-attempt timeout
    pub timed_out: bool,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            retry_after: None,
            timed_out: false,
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, detail)
    }

    pub fn auth(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, detail)
    }

    pub fn bad_response(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::BadResponse, detail)
    }

    pub fn throttled(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Throttled, detail)
    }

    pub fn timeout(after: Duration) -> Self {
        Self {
            timed_out: true,
            ..Self::transport(format!("attempt timed out after {} ms", after.as_millis()))
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

/// Errors returned to the caller of a resolution
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every eligible pair failed or was skipped
    #[error("chain '{chain}' exhausted after trying [{}]: {last_reason}", .attempted.join(", "))]
    ChainExhausted {
        chain: String,
        attempted: Vec<String>,
        last_reason: String,
    },

    /// The caller's overall deadline passed
    #[error("chain '{chain}' exceeded its deadline after trying [{}]", .attempted.join(", "))]
    DeadlineExceeded {
        chain: String,
        attempted: Vec<String>,
    },

    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("client error: {0}")]
    Client(String),
}

impl GatewayError {
    /// Reason string for `ChainExhausted` when nothing could be attempted
    pub const NO_ELIGIBLE_BACKEND: &'static str = "no-eligible-backend";

    /// Backends attempted before the error, when the error comes from a resolution
    pub fn attempted(&self) -> &[String] {
        match self {
            GatewayError::ChainExhausted { attempted, .. }
            | GatewayError::DeadlineExceeded { attempted, .. } => attempted,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(2.5, Some(Duration::from_millis(2500)) ; "fractional")]
    #[test_case(1e300, Some(MAX_RETRY_HINT) ; "beyond duration range")]
    #[test_case(18446744073709551615.0, Some(MAX_RETRY_HINT) ; "u64 max")]
    #[test_case(172_800.0, Some(MAX_RETRY_HINT) ; "two days")]
    #[test_case(f64::INFINITY, None ; "infinite")]
    #[test_case(f64::NAN, None ; "nan")]
    #[test_case(-1.0, None ; "negative")]
    fn test_retry_hint_from_secs(seconds: f64, expected: Option<Duration>) {
        assert_eq!(retry_hint_from_secs(seconds), expected);
    }

    #[test]
    fn test_only_auth_is_fatal() {
        for kind in [
            FailureKind::Transport,
            FailureKind::RateLimited,
            FailureKind::BadResponse,
            FailureKind::Rejected,
            FailureKind::Throttled,
        ] {
            assert!(!kind.is_fatal(), "{kind} should be retryable");
        }
        assert!(FailureKind::Auth.is_fatal());
    }

    #[test]
    fn test_throttled_does_not_count() {
        assert!(!FailureKind::Throttled.counts_against_health());
        assert!(FailureKind::RateLimited.counts_against_health());
    }

    #[test]
    fn test_timeout_failure_shape() {
        let failure = Failure::timeout(Duration::from_millis(1500));
        assert_eq!(failure.kind, FailureKind::Transport);
        assert!(failure.timed_out);
        assert_eq!(failure.to_string(), "transport: attempt timed out after 1500 ms");
    }

    #[test]
    fn test_exhausted_message_lists_backends() {
        let err = GatewayError::ChainExhausted {
            chain: "normal".to_string(),
            attempted: vec!["a".to_string(), "b".to_string()],
            last_reason: "transport".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "chain 'normal' exhausted after trying [a, b]: transport"
        );
        assert_eq!(err.attempted().len(), 2);
    }
}
