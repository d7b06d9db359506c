//! Error types surfaced by the client and consumed by retry policies.
//!
//! Taxonomy:
//! - [`RequestError::Response`]: the API answered with a well-formed rejection. Final, never
//!   retried.
//! - [`RequestError::RateLimit`]: transient; may carry a server-suggested delay which the default
//!   policy honors exactly.
//! - [`RequestError::Timeout`], [`RequestError::Server`], [`RequestError::Network`]: transient.
//!
//! Errors are propagated verbatim: neither the retry engine nor the client wraps them.
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// A well-formed rejection returned by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseError {
    /// HTTP status of the rejection.
    pub status: u16,
    /// Machine readable error code (`code` in the body).
    pub code: Option<String>,
    /// Human readable message (`message` in the body).
    pub message: Option<String>,
    /// Field-level errors, passed through untouched.
    pub errors: Option<serde_json::Value>,
}

impl ResponseError {
    /// Build a rejection from a decoded JSON body.
    pub fn from_body(status: u16, body: &serde_json::Value) -> Self {
        let text = |key: &str| body.get(key).and_then(|v| v.as_str()).map(str::to_owned);
        Self {
            status,
            code: text("code"),
            message: text("message"),
            errors: body.get("errors").cloned(),
        }
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{} ({})", message, code),
            (Some(code), None) => write!(f, "request rejected ({})", code),
            (None, Some(message)) => write!(f, "{}", message),
            (None, None) => write!(f, "request rejected with status {}", self.status),
        }
    }
}

/// Failure of a single request attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// The API asked the client to slow down.
    #[error("rate limited{}", fmt_hint(.retry_after))]
    RateLimit {
        /// Server-suggested delay before the next attempt.
        retry_after: Option<Duration>,
    },
    /// The attempt did not complete within its timeout.
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    /// The API failed without a structured rejection body.
    #[error("server error: {status} {status_text}")]
    Server { status: u16, status_text: String },
    /// The API rejected the request; retrying cannot change the outcome.
    #[error("{0}")]
    Response(ResponseError),
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),
}

fn fmt_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(" (retry after {:?})", delay),
        None => String::new(),
    }
}

impl RequestError {
    /// Whether this error must never be retried.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Response(_))
    }

    /// Server-suggested delay, if the error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Stable kind name used in log entries.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RateLimit { .. } => "RateLimitError",
            Self::Timeout { .. } => "TimeoutError",
            Self::Server { .. } => "ServerError",
            Self::Response(_) => "ResponseError",
            Self::Network(_) => "NetworkError",
        }
    }

    /// Check if this error is a rate-limit response.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }

    /// Check if this error is an attempt timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Borrow the rejection if this is a final response error.
    pub fn as_response(&self) -> Option<&ResponseError> {
        match self {
            Self::Response(e) => Some(e),
            _ => None,
        }
    }
}

/// What a retry policy needs to know about an error.
pub trait Retryable {
    /// Final errors are declined regardless of the attempt count.
    fn is_final(&self) -> bool;

    /// Delay suggested by the remote side, overriding the policy's own schedule.
    fn retry_after_hint(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for RequestError {
    fn is_final(&self) -> bool {
        RequestError::is_final(self)
    }

    fn retry_after_hint(&self) -> Option<Duration> {
        self.retry_after()
    }
}

/// Loggable summary of an error, as carried by `aborted` and `request failed` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub name: String,
    pub message: String,
}

impl ErrorSummary {
    /// Summarize any error type by its `Display` output.
    pub fn new(name: impl Into<String>, err: &dyn std::error::Error) -> Self {
        Self { name: name.into(), message: err.to_string() }
    }
}

impl From<&RequestError> for ErrorSummary {
    fn from(err: &RequestError) -> Self {
        Self::new(err.name(), err)
    }
}

impl fmt::Display for ErrorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_response_errors_are_final() {
        let rejection = RequestError::Response(ResponseError {
            status: 400,
            code: Some("SomeError".into()),
            message: None,
            errors: None,
        });
        assert!(rejection.is_final());
        assert!(!RequestError::RateLimit { retry_after: None }.is_final());
        assert!(!RequestError::Timeout { timeout: Duration::from_secs(10) }.is_final());
        assert!(!RequestError::Server { status: 502, status_text: "Bad Gateway".into() }
            .is_final());
        assert!(!RequestError::Network("connection reset".into()).is_final());
    }

    #[test]
    fn retry_after_only_from_rate_limit() {
        let limited = RequestError::RateLimit { retry_after: Some(Duration::from_millis(1500)) };
        assert_eq!(limited.retry_after(), Some(Duration::from_millis(1500)));
        assert_eq!(limited.retry_after_hint(), Some(Duration::from_millis(1500)));
        let server = RequestError::Server { status: 500, status_text: "oops".into() };
        assert_eq!(server.retry_after(), None);
    }

    #[test]
    fn response_error_reads_body_fields() {
        let body = json!({"code": "SomeError", "message": "Bad card", "errors": [{"field": "x"}]});
        let err = ResponseError::from_body(400, &body);
        assert_eq!(err.code.as_deref(), Some("SomeError"));
        assert_eq!(err.message.as_deref(), Some("Bad card"));
        assert_eq!(err.errors, Some(json!([{"field": "x"}])));
        assert_eq!(err.to_string(), "Bad card (SomeError)");
    }

    #[test]
    fn rate_limit_display_mentions_hint() {
        let err = RequestError::RateLimit { retry_after: Some(Duration::from_secs(2)) };
        assert!(err.to_string().contains("retry after 2s"));
        let err = RequestError::RateLimit { retry_after: None };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn summary_uses_kind_name() {
        let err = RequestError::Network("test".into());
        let summary = ErrorSummary::from(&err);
        assert_eq!(summary.name, "NetworkError");
        assert_eq!(summary.message, "network error: test");
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({"name": "NetworkError", "message": "network error: test"})
        );
    }
}
