//! Error taxonomy shared by the RPC client and the controller.
//!
//! The split that matters here is not "client vs. server" — it's
//! recoverable vs. terminal. `RemoteTaskError::is_recoverable` is what
//! `StatusFetcher`/`InfoFetcher`/`UpdateSender` consult to decide whether
//! to keep retrying against the error-duration budget or fail the task
//! outright.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::TaskId;

/// The two kinds of task failure the coordinator distinguishes, per the
/// wire protocol's failure-reporting convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The worker is alive and reachable, but its instance id (or a
    /// regression in status version) proves it is not running the task
    /// the controller thinks it is.
    RemoteTaskMismatch,
    /// The controller exhausted its retry budget talking to the worker
    /// without ever getting a clean answer.
    RemoteTaskError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::RemoteTaskMismatch => "REMOTE_TASK_MISMATCH",
            ErrorCode::RemoteTaskError => "REMOTE_TASK_ERROR",
        };
        write!(f, "{s}")
    }
}

/// A single recorded failure, carried in [`crate::model::TaskStatus`] and
/// surfaced to listeners when a task transitions to `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub code: ErrorCode,
    pub message: String,
    pub task_id: Option<TaskId>,
    pub timestamp: DateTime<Utc>,
}

impl Failure {
    pub fn mismatch(task_id: TaskId, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::RemoteTaskMismatch,
            message: message.into(),
            task_id: Some(task_id),
            timestamp: Utc::now(),
        }
    }

    pub fn remote_error(task_id: TaskId, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::RemoteTaskError,
            message: message.into(),
            task_id: Some(task_id),
            timestamp: Utc::now(),
        }
    }
}

/// Errors produced while talking to a remote worker, or while applying
/// the results of that conversation to a task's state.
#[derive(Debug, Error)]
pub enum RemoteTaskError {
    #[error("http transport error talking to {uri}: {source}")]
    Transport {
        uri: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("worker at {uri} returned status {status}: {message}")]
    UnexpectedStatus {
        uri: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode response body from {uri}: {source}")]
    Decode {
        uri: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("task {task_id} instance mismatch: expected {expected}, worker reported {actual}")]
    InstanceMismatch {
        task_id: TaskId,
        expected: String,
        actual: String,
    },

    #[error("task {task_id} status version regressed: had {previous}, worker reported {reported}")]
    VersionRegression {
        task_id: TaskId,
        previous: u64,
        reported: u64,
    },

    #[error("task {task_id} exhausted its error budget after {attempts} attempts over {elapsed_millis}ms: {last_message}")]
    Exhausted {
        task_id: TaskId,
        attempts: u32,
        elapsed_millis: u64,
        last_message: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RemoteTaskError {
    /// Whether retrying this exact failure might succeed.
    ///
    /// Transport errors and 5xx responses are transient — worth retrying
    /// against the configured error-duration budget. A mismatch or
    /// version regression is proof the worker has moved on without the
    /// controller; retrying talks to a ghost. An exhausted budget and bad
    /// config are terminal by construction.
    pub fn is_recoverable(&self) -> bool {
        match self {
            RemoteTaskError::Transport { .. } => true,
            RemoteTaskError::UnexpectedStatus { status, .. } => *status >= 500,
            RemoteTaskError::Decode { .. } => true,
            RemoteTaskError::InstanceMismatch { .. } => false,
            RemoteTaskError::VersionRegression { .. } => false,
            RemoteTaskError::Exhausted { .. } => false,
            RemoteTaskError::Config(_) => false,
        }
    }

    /// The [`ErrorCode`] this failure should surface as, once the
    /// controller decides to stop retrying and fail the task.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            RemoteTaskError::InstanceMismatch { .. } | RemoteTaskError::VersionRegression { .. } => {
                ErrorCode::RemoteTaskMismatch
            }
            _ => ErrorCode::RemoteTaskError,
        }
    }
}

pub type RemoteTaskResult<T> = Result<T, RemoteTaskError>;
