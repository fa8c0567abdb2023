//! Error types for scheduler and dispatcher operations.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors produced by the work scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Work was submitted after `stop_threads`, or a blocking waiter was
    /// released by shutdown before its work finished.
    #[error("scheduler has been stopped")]
    Stopped,
    /// No worker thread could be started, or the configuration allows none.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The operation is only valid after `stop_threads`.
    #[error("scheduler must be stopped first")]
    NotStopped,
    /// The delay cannot be turned into a deadline.
    #[error("invalid delay: {0:?}")]
    InvalidDelay(Duration),
}

/// Classification of a failed network request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestErrorKind {
    /// I/O failure while performing the call.
    TransportFailure,
    /// The platform refused network access.
    PermissionDenied,
    /// The call completed with a non-success status.
    ProtocolFailure,
    /// Anything not covered by the other kinds.
    UnexpectedFailure,
    /// The underlying scheduler was stopped before the request could run.
    SchedulerStopped,
    /// The dispatcher was shut down while the request was held.
    Cancelled,
}

impl fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TransportFailure => "transport failure",
            Self::PermissionDenied => "permission denied",
            Self::ProtocolFailure => "protocol failure",
            Self::UnexpectedFailure => "unexpected failure",
            Self::SchedulerStopped => "scheduler stopped",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Terminal failure delivered to a response sink.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {detail}")]
pub struct RequestError {
    /// What went wrong.
    pub kind: RequestErrorKind,
    /// Human-readable context.
    pub detail: String,
    /// Response status, present for protocol failures.
    pub status: Option<u16>,
}

impl RequestError {
    /// Build an error of the given kind.
    pub fn new(kind: RequestErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            status: None,
        }
    }

    /// Transport-level I/O failure.
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(RequestErrorKind::TransportFailure, detail)
    }

    /// Network access refused by the platform.
    pub fn permission_denied(detail: impl Into<String>) -> Self {
        Self::new(RequestErrorKind::PermissionDenied, detail)
    }

    /// Non-success response status.
    pub fn protocol(status: u16, detail: impl Into<String>) -> Self {
        Self {
            kind: RequestErrorKind::ProtocolFailure,
            detail: detail.into(),
            status: Some(status),
        }
    }

    /// Wrap an unanticipated failure, keeping its full cause chain as detail.
    pub fn unexpected(cause: &anyhow::Error) -> Self {
        Self::new(RequestErrorKind::UnexpectedFailure, format!("{cause:#}"))
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::permission_denied(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}
