//! Local filesystem layout for synchronized files.
//!
//! ```text
//! <root>/
//!   <owner>/
//!     <repo>/
//!       [<branch>/]        (branch-scoped layout only)
//!         <relative path>  (mirrors the remote path structure)
//! ```
//!
//! Paths are computed purely; nothing here touches the filesystem, so the
//! offline fallback can recompute them without a network call.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Directory scheme under the sync root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// `root/owner/repo/path`
    #[default]
    Flat,
    /// `root/owner/repo/branch/path`
    BranchScoped,
}

/// Convert a slash-separated remote path into a relative native path.
///
/// Returns `None` for paths that would escape the directory they are joined
/// onto: empty, absolute, or containing `.`/`..` segments.
pub fn native_relative_path(remote_path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for segment in remote_path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return None;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => out.push(part),
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// `<root>/<owner>/<repo>[/<branch>]`
pub fn repo_dir(root: &Path, layout: Layout, owner: &str, repo: &str, branch: &str) -> PathBuf {
    let dir = root.join(owner).join(repo);
    match layout {
        Layout::Flat => dir,
        Layout::BranchScoped => dir.join(branch_dir_name(branch)),
    }
}

/// Full local path for a remote file, or `None` if `remote_path` is unsafe.
pub fn local_path(
    root: &Path,
    layout: Layout,
    owner: &str,
    repo: &str,
    branch: &str,
    remote_path: &str,
) -> Option<PathBuf> {
    let relative = native_relative_path(remote_path)?;
    Some(repo_dir(root, layout, owner, repo, branch).join(relative))
}

/// Slash-separated path of a remote file relative to the sync root.
///
/// `None` when any part (owner and repo included) would escape the root.
pub fn root_relative_path(
    layout: Layout,
    owner: &str,
    repo: &str,
    branch: &str,
    remote_path: &str,
) -> Option<String> {
    let joined = match layout {
        Layout::Flat => format!("{owner}/{repo}/{remote_path}"),
        Layout::BranchScoped => {
            format!("{owner}/{repo}/{}/{remote_path}", branch_dir_name(branch))
        }
    };
    native_relative_path(&joined).map(|_| joined)
}

// Branch names may contain slashes (`release/1.x`); keep them one level deep.
fn branch_dir_name(branch: &str) -> String {
    branch.replace('/', "_")
}
