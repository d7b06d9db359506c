use crate::error::ErrorSummary;
use crate::retry::RetryDecision;
use serde::Serialize;
use std::fmt;

/// One entry of a call's log trail.
///
/// Serialized with a `t` discriminant, e.g.
/// `{"t":"request failed","attempts":1,"retryAfter":0,"err":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t")]
pub enum LogEntry {
    /// An attempt is about to be sent. Emitted by the transport.
    #[serde(rename = "request")]
    Request {
        method: String,
        url: String,
        /// Attempt timeout in milliseconds.
        timeout: u64,
    },
    /// The API answered. Emitted by the transport.
    #[serde(rename = "response")]
    Response {
        status: u16,
        #[serde(rename = "statusText")]
        status_text: String,
        #[serde(rename = "requestId")]
        request_id: Option<String>,
    },
    /// An attempt was abandoned (timeout or connection failure). Emitted by the transport.
    #[serde(rename = "aborted")]
    Aborted { abort: ErrorSummary },
    /// An attempt failed and the policy was consulted. Emitted by the client.
    #[serde(rename = "request failed")]
    RequestFailed {
        attempts: u32,
        #[serde(rename = "retryAfter")]
        retry_after: RetryDecision,
        err: ErrorSummary,
    },
    /// The response stream was fully consumed. Emitted by the transport.
    #[serde(rename = "closing stream")]
    ClosingStream,
}

impl LogEntry {
    /// The `t` discriminant.
    pub fn kind(&self) -> &'static str {
        match self {
            LogEntry::Request { .. } => "request",
            LogEntry::Response { .. } => "response",
            LogEntry::Aborted { .. } => "aborted",
            LogEntry::RequestFailed { .. } => "request failed",
            LogEntry::ClosingStream => "closing stream",
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntry::Request { method, url, timeout } => {
                write!(f, "request({} {}, timeout={}ms)", method, url, timeout)
            }
            LogEntry::Response { status, status_text, .. } => {
                write!(f, "response({} {})", status, status_text)
            }
            LogEntry::Aborted { abort } => write!(f, "aborted({})", abort),
            LogEntry::RequestFailed { attempts, retry_after, err } => {
                write!(f, "request failed(#{}, retryAfter={}, err={})", attempts, retry_after, err)
            }
            LogEntry::ClosingStream => write!(f, "closing stream"),
        }
    }
}

/// A log entry tagged with the correlation id of the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub id: u64,
    #[serde(flatten)]
    pub entry: LogEntry,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.entry)
    }
}
