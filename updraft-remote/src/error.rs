//! Error types for updraft-remote.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// All errors that can arise from talking to the remote content store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Owner, repository, path or ref does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Call budget exhausted (HTTP 403/429 or zero remaining).
    #[error(
        "API rate limit exhausted{}",
        .reset_at.map(|t| format!(" (resets at {})", t.to_rfc3339())).unwrap_or_default()
    )]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// The remote tree listing was cut short; never usable as partial data.
    #[error("remote listing for tree {tree} is truncated")]
    Truncated { tree: String },

    /// The commit-history lookup rejected the ref (HTTP 404/422).
    #[error("bad reference '{reference}'")]
    BadReference { reference: String },

    /// The batch needs more calls than the budget has left.
    #[error("insufficient API budget: need {required} calls, {remaining} remaining")]
    InsufficientBudget { required: u64, remaining: u64 },

    /// DNS, probe or health check failed.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Any other non-success HTTP status.
    #[error("unexpected HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Connection-level failure (DNS, TLS, timeout, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// Local I/O failure while writing a download.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Response body did not match the expected JSON shape.
    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A remote path that would escape its local directory.
    #[error("remote path '{path}' cannot be mapped to a local path")]
    InvalidPath { path: String },
}

impl RemoteError {
    /// Network-shaped failures that may succeed on a later run.
    ///
    /// Truncation, missing objects and bad refs are fatal: retrying yields
    /// the same answer.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::NetworkUnavailable(_)
            | RemoteError::Transport(_)
            | RemoteError::RateLimited { .. }
            | RemoteError::InsufficientBudget { .. } => true,
            RemoteError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Convenience constructor for [`RemoteError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RemoteError {
    RemoteError::Io {
        path: path.into(),
        source,
    }
}
