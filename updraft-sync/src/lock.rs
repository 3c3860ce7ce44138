//! Advisory single-writer lock per publish root.
//!
//! ```text
//! ~/.updraft/locks/<sha256(final root)>.lock
//! ```

use std::fs::{File, OpenOptions};
use std::path::{Component, Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};

use updraft_core::config;

use crate::error::{io_err, SyncError};

/// Held for the duration of one run. Released when dropped.
#[derive(Debug)]
pub struct PublishLock {
    path: PathBuf,
    _file: File,
}

impl PublishLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One spelling per directory: `out`, `out/`, `./out/.` and the absolute path
/// all normalize alike.
///
/// The deepest existing ancestor is canonicalized and the missing tail is
/// appended, so the result is the same before and after the directory is
/// created.
pub fn normalize_root(root: &Path) -> PathBuf {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(root),
            Err(_) => root.to_path_buf(),
        }
    };
    let mut lexical = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other),
        }
    }

    let mut tail = Vec::new();
    let mut existing = lexical.as_path();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return tail
                .iter()
                .rev()
                .fold(canonical, |path, name| path.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                existing = parent;
            }
            _ => return lexical.clone(),
        }
    }
}

/// Lock file for `final_root`, keyed by a digest of its normalized path.
pub fn lock_path_at(home: &Path, final_root: &Path) -> PathBuf {
    let root = normalize_root(final_root);
    let digest = hex::encode(Sha256::digest(root.to_string_lossy().as_bytes()));
    config::state_dir_at(home)
        .join("locks")
        .join(format!("{digest}.lock"))
}

/// Take the exclusive lock for `final_root` without blocking.
///
/// Returns `SyncError::Locked` if another holder has it.
pub fn acquire_at(home: &Path, final_root: &Path) -> Result<PublishLock, SyncError> {
    let path = lock_path_at(home, final_root);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;

    if file.try_lock_exclusive().is_err() {
        return Err(SyncError::Locked { path });
    }
    tracing::debug!("locked {} for {}", path.display(), final_root.display());
    Ok(PublishLock { path, _file: file })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_holder_is_refused() {
        let home = TempDir::new().unwrap();
        let root = home.path().join("out");
        let _first = acquire_at(home.path(), &root).unwrap();
        let err = acquire_at(home.path(), &root).unwrap_err();
        assert!(matches!(err, SyncError::Locked { .. }));
    }

    #[test]
    fn released_on_drop() {
        let home = TempDir::new().unwrap();
        let root = home.path().join("out");
        {
            let _lock = acquire_at(home.path(), &root).unwrap();
        }
        let lock = acquire_at(home.path(), &root).unwrap();
        assert!(lock.path().starts_with(home.path().join(".updraft").join("locks")));
    }

    #[test]
    fn alternate_spellings_share_one_lock() {
        let home = TempDir::new().unwrap();
        let root = home.path().join("out");
        std::fs::create_dir_all(&root).unwrap();
        let _held = acquire_at(home.path(), &root).unwrap();

        let spellings = [
            PathBuf::from(format!("{}/", root.display())),
            root.join("."),
            home.path().join("elsewhere").join("..").join("out"),
        ];
        for spelling in spellings {
            let err = acquire_at(home.path(), &spelling).unwrap_err();
            assert!(
                matches!(err, SyncError::Locked { .. }),
                "{} was not refused",
                spelling.display()
            );
        }
    }

    #[test]
    fn lock_path_survives_directory_creation() {
        let home = TempDir::new().unwrap();
        let root = home.path().join("not").join("yet");
        let before = lock_path_at(home.path(), &root.join("."));
        std::fs::create_dir_all(&root).unwrap();
        assert_eq!(lock_path_at(home.path(), &root), before);
    }

    #[test]
    fn relative_root_resolves_against_cwd() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(
            normalize_root(Path::new("./target-dir/.")),
            normalize_root(&cwd.join("target-dir"))
        );
    }

    #[test]
    fn distinct_roots_do_not_contend() {
        let home = TempDir::new().unwrap();
        let _a = acquire_at(home.path(), &home.path().join("a")).unwrap();
        let _b = acquire_at(home.path(), &home.path().join("b")).unwrap();
    }
}
