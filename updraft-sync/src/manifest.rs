//! Manifest store: the last published listing per directory sync.
//!
//! Persists a [`Manifest`] JSON document at
//! `<home>/.updraft/manifests/<key>.json`. Writes use the same atomic
//! `.tmp` + rename pattern as the config file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use updraft_core::{config, DirectorySpec, Listing, ObjectId, ObjectKind, RemoteItem};

use crate::error::{io_err, SyncError};
use crate::lock::normalize_root;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub object_id: ObjectId,
    #[serde(default)]
    pub size: u64,
}

/// On-disk manifest payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "ref")]
    pub reference: String,
    pub commit: String,
    pub synced_at: DateTime<Utc>,
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn from_listing(listing: &Listing, synced_at: DateTime<Utc>) -> Self {
        Self {
            reference: listing.reference.clone(),
            commit: listing.commit.clone(),
            synced_at,
            files: listing
                .blobs()
                .map(|item| ManifestEntry {
                    path: item.relative_path.clone(),
                    object_id: item.object_id.clone(),
                    size: item.size,
                })
                .collect(),
        }
    }

    /// Rebuild a listing for offline verification. URLs are not recorded, so
    /// the result can be verified against but not staged from.
    pub fn to_listing(&self) -> Result<Listing, SyncError> {
        let items = self
            .files
            .iter()
            .map(|entry| {
                let native_path = updraft_core::layout::native_relative_path(&entry.path)
                    .ok_or_else(|| {
                        SyncError::ContractViolation(format!(
                            "manifest path '{}' escapes its directory",
                            entry.path
                        ))
                    })?;
                Ok(RemoteItem {
                    relative_path: entry.path.clone(),
                    native_path,
                    kind: ObjectKind::Blob,
                    object_id: entry.object_id.clone(),
                    size: entry.size,
                    mode: String::new(),
                    mutable_url: String::new(),
                    pinned_url: None,
                })
            })
            .collect::<Result<Vec<_>, SyncError>>()?;
        Ok(Listing {
            reference: self.reference.clone(),
            commit: self.commit.clone(),
            items,
            truncated: false,
            committed_at: None,
        })
    }

    /// Listed paths with no file under `dest`. Unsafe paths count as missing.
    pub fn missing_under(&self, dest: &Path) -> Vec<String> {
        self.files
            .iter()
            .filter(|entry| {
                updraft_core::layout::native_relative_path(&entry.path)
                    .map_or(true, |rel| !dest.join(rel).is_file())
            })
            .map(|entry| entry.path.clone())
            .collect()
    }
}

/// Stable file key for a directory sync: `<owner>-<repo>-<digest of dest>`.
///
/// `dest` is normalized first, so any spelling of it finds the same manifest.
pub fn manifest_key(spec: &DirectorySpec) -> String {
    let dest = normalize_root(&spec.dest);
    let digest = hex::encode(Sha256::digest(dest.to_string_lossy().as_bytes()));
    format!("{}-{}-{}", spec.owner, spec.repo, &digest[..16])
}

/// `<home>/.updraft/manifests/<key>.json`
pub fn manifest_path_at(home: &Path, key: &str) -> PathBuf {
    config::state_dir_at(home)
        .join("manifests")
        .join(format!("{key}.json"))
}

/// Load the manifest for `key`, or `None` if no sync has completed yet.
pub fn load_at(home: &Path, key: &str) -> Result<Option<Manifest>, SyncError> {
    let path = manifest_path_at(home, key);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Save the manifest for `key` atomically.
pub fn save_at(home: &Path, key: &str, manifest: &Manifest) -> Result<(), SyncError> {
    let path = manifest_path_at(home, key);
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid manifest path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(manifest)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}
