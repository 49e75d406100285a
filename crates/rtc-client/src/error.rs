//! Error types for the HTTP transport.
//!
//! This crate only knows about talking to a worker over HTTP; it has no
//! opinion on what a transient-vs-fatal classification means for a task's
//! state machine. That judgment call belongs to
//! [`rtc_shared::errors::RemoteTaskError`], which wraps these.

use thiserror::Error;

/// Client operation result type.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors produced while executing a single HTTP request against a worker.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid worker uri {uri}: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to encode request body: {0}")]
    Encode(String),

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("worker returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("request to {uri} timed out after {elapsed_millis}ms")]
    Timeout { uri: String, elapsed_millis: u64 },

    #[error("rpc client has been shut down")]
    Rejected,
}

impl ClientError {
    /// Whether the failure is transient (worth retrying) as opposed to
    /// something a retry can't fix.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ClientError::InvalidUri { .. } => false,
            ClientError::Encode(_) => false,
            ClientError::Decode(_) => false,
            ClientError::UnexpectedStatus { status, .. } => *status >= 500,
            ClientError::Timeout { .. } => true,
            ClientError::Rejected => false,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            ClientError::UnexpectedStatus { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
