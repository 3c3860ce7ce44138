//! Default branches resolved online, remembered for offline path lookups.
//!
//! ```text
//! ~/.updraft/branches.json   { "owner/repo": "branch", ... }
//! ```
//!
//! Branch-scoped layouts put files under the branch name. When a descriptor
//! has no ref, only a previous online run knows which branch that was.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use updraft_core::config;

use crate::error::{io_err, SyncError};

pub type BranchMap = BTreeMap<String, String>;

fn key(owner: &str, repo: &str) -> String {
    format!("{owner}/{repo}")
}

/// `<home>/.updraft/branches.json`
pub fn branches_path_at(home: &Path) -> PathBuf {
    config::state_dir_at(home).join("branches.json")
}

/// Every remembered branch; empty before the first online run.
pub fn load_at(home: &Path) -> Result<BranchMap, SyncError> {
    let path = branches_path_at(home);
    if !path.exists() {
        return Ok(BranchMap::new());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn default_branch_at(home: &Path, owner: &str, repo: &str) -> Result<Option<String>, SyncError> {
    Ok(load_at(home)?.remove(&key(owner, repo)))
}

/// Merge `(owner, repo, branch)` entries into the store. No write when
/// nothing changed.
pub fn record_at<'a>(
    home: &Path,
    entries: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>,
) -> Result<(), SyncError> {
    let mut map = load_at(home)?;
    let mut changed = false;
    for (owner, repo, branch) in entries {
        let previous = map.insert(key(owner, repo), branch.to_string());
        changed |= previous.as_deref() != Some(branch);
    }
    if !changed {
        return Ok(());
    }

    let path = branches_path_at(home);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let json = serde_json::to_string_pretty(&map)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    tracing::debug!("remembered default branches in {}", path.display());
    Ok(())
}
