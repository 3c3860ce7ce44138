//! Error types for updraft-sync.

use std::path::PathBuf;

use thiserror::Error;

use updraft_core::ConfigError;
use updraft_remote::RemoteError;

/// All errors that can arise from verify, stage, publish and orchestration.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Resolution, preflight or download failure from the remote crate.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Local content does not hash to the declared object id.
    #[error("integrity mismatch at {path}")]
    IntegrityMismatch { path: PathBuf },

    /// A download exhausted its retries.
    #[error("download of {url} failed after {attempts} attempt(s): {reason}")]
    DownloadFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// A caller broke a precondition (unverified staging, truncated listing).
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Commit failed; everything already committed was rolled back.
    #[error("publish failed at {path}: {source}")]
    PublishFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another run holds the publish lock for this root.
    #[error("another update is running (lock held at {path})")]
    Locked { path: PathBuf },

    /// Manifest serialization/deserialization error.
    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
