//! Post-write normalization: mtime pinned to the remote commit time and the
//! network-provenance marker cleared.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use filetime::FileTime;

use crate::error::{io_err, SyncError};

fn file_time(time: DateTime<Utc>) -> FileTime {
    FileTime::from_unix_time(time.timestamp(), time.timestamp_subsec_nanos())
}

/// Set the modification time of `path` to `time`.
pub fn normalize_mtime(path: &Path, time: DateTime<Utc>) -> Result<(), SyncError> {
    filetime::set_file_mtime(path, file_time(time)).map_err(|e| io_err(path, e))
}

/// Whether `path` exists and its mtime is within `tolerance` of `time`.
pub fn mtime_matches(path: &Path, time: DateTime<Utc>, tolerance: Duration) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    let local = FileTime::from_last_modification_time(&meta);
    let remote = file_time(time);
    let diff_nanos = (i128::from(local.unix_seconds()) * 1_000_000_000 + i128::from(local.nanoseconds()))
        - (i128::from(remote.unix_seconds()) * 1_000_000_000 + i128::from(remote.nanoseconds()));
    diff_nanos.unsigned_abs() <= tolerance.as_nanos()
}

/// Remove the "downloaded from the internet" marker.
#[cfg(windows)]
pub fn clear_provenance(path: &Path) -> Result<(), SyncError> {
    let mut stream = path.as_os_str().to_os_string();
    stream.push(":Zone.Identifier");
    match std::fs::remove_file(&stream) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Remove the "downloaded from the internet" marker. No such marker here.
#[cfg(not(windows))]
pub fn clear_provenance(_path: &Path) -> Result<(), SyncError> {
    Ok(())
}

/// Normalize mtime and clear provenance in one step.
pub fn finalize(path: &Path, commit_time: DateTime<Utc>) -> Result<(), SyncError> {
    normalize_mtime(path, commit_time)?;
    clear_provenance(path)
}
