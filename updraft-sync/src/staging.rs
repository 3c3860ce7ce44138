//! Download a listing into an isolated temporary directory.
//!
//! The staging directory is the only thing written here. On any failure it is
//! removed before returning, so callers never see half-staged content.
//! Downloads are checked against their declared object id when it names a
//! known hash; a mismatch counts as a failed attempt.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use updraft_core::{Listing, RemoteItem};
use updraft_remote::{GitHubClient, Transport};

use crate::error::{io_err, SyncError};
use crate::verify::file_matches;

const STAGE_PREFIX: &str = "updraft-stage-";

/// Fixed-delay retry, no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// A fully populated staging directory. Removed on drop.
#[derive(Debug)]
pub struct StagingDir {
    dir: TempDir,
    files: Vec<PathBuf>,
}

impl StagingDir {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Staged files in listing order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Remove the directory now, surfacing any error.
    pub fn close(self) -> Result<(), SyncError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| io_err(path, e))
    }
}

/// Stage every blob of `listing` under the system temp directory.
pub fn stage<T: Transport>(
    listing: &Listing,
    client: &GitHubClient<T>,
    retry: RetryPolicy,
) -> Result<StagingDir, SyncError> {
    stage_in(listing, client, retry, &std::env::temp_dir())
}

/// Stage every blob of `listing` in a fresh directory under `parent`.
pub fn stage_in<T: Transport>(
    listing: &Listing,
    client: &GitHubClient<T>,
    retry: RetryPolicy,
    parent: &Path,
) -> Result<StagingDir, SyncError> {
    if listing.truncated {
        return Err(SyncError::ContractViolation(
            "refusing to stage a truncated listing".into(),
        ));
    }
    let dir = tempfile::Builder::new()
        .prefix(STAGE_PREFIX)
        .tempdir_in(parent)
        .map_err(|e| io_err(parent, e))?;

    let mut files = Vec::new();
    for item in listing.blobs() {
        // `dir` drops on the error path and takes partial downloads with it.
        let dest = dir.path().join(&item.native_path);
        download_with_retry(client, item, &dest, retry)?;
        files.push(dest);
    }
    tracing::info!(
        "staged {} file(s) in {}",
        files.len(),
        dir.path().display()
    );
    Ok(StagingDir { dir, files })
}

fn download_with_retry<T: Transport>(
    client: &GitHubClient<T>,
    item: &RemoteItem,
    dest: &Path,
    retry: RetryPolicy,
) -> Result<(), SyncError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let url = item.download_url();
    let attempts = retry.attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        match client.download(url, dest) {
            Ok(bytes) if content_matches(item, dest) => {
                tracing::debug!("downloaded {url} ({bytes} bytes)");
                return Ok(());
            }
            Ok(_) => {
                tracing::warn!(
                    "download {attempt}/{attempts} of {url} does not hash to {}",
                    item.object_id
                );
                last_error = None;
            }
            Err(e) => {
                tracing::warn!("download {attempt}/{attempts} of {url} failed: {e}");
                last_error = Some(e.to_string());
            }
        }
        let _ = std::fs::remove_file(dest);
        if attempt < attempts {
            thread::sleep(retry.delay);
        }
    }
    Err(match last_error {
        Some(reason) => SyncError::DownloadFailed {
            url: url.to_string(),
            attempts,
            reason,
        },
        None => SyncError::IntegrityMismatch {
            path: item.native_path.clone(),
        },
    })
}

/// Ids without a known hash (file batches fill theirs in after staging)
/// are not checked here.
fn content_matches(item: &RemoteItem, staged: &Path) -> bool {
    item.object_id.algorithm().is_none() || file_matches(staged, &item.object_id)
}
