//! All-or-nothing publish of a verified staging directory.
//!
//! ## Protocol
//!
//! 1. Refuse unless the staging directory verifies against the listing.
//! 2. Skip items whose destination already holds the declared object id.
//! 3. Copy every remaining staged file to a sibling `.<name>.<uuid>.tmp`
//!    next to its destination, creating (and recording) missing parents.
//! 4. Commit in listing order. Existing destinations are first preserved as
//!    a sibling `.<name>.<uuid>.bak`, then replaced by renaming the temp.
//! 5. On the first commit failure, undo in reverse order, remove temps and
//!    created directories, and report the failing path.
//! 6. On success, delete backups.
//!
//! Only paths named in the listing are touched. Directories are created but
//! never renamed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use updraft_core::Listing;

use crate::error::SyncError;
use crate::verify::{file_matches, verify};

// ---------------------------------------------------------------------------
// Filesystem seam
// ---------------------------------------------------------------------------

/// The filesystem primitives the publisher commits through.
pub trait CommitOps {
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`CommitOps`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdCommitOps;

impl CommitOps for StdCommitOps {
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        fs::hard_link(original, link)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

// ---------------------------------------------------------------------------
// Plan + report
// ---------------------------------------------------------------------------

/// Where one item lives during a publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingPlan {
    pub relative_path: String,
    pub staged_source: PathBuf,
    pub destination: PathBuf,
    pub sibling_temp: PathBuf,
    pub sibling_backup: PathBuf,
    /// Destination existed when the plan was made.
    pub replaces: bool,
}

impl StagingPlan {
    fn new(relative_path: &str, staged_source: PathBuf, destination: PathBuf) -> Self {
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = Uuid::new_v4().simple();
        let sibling = |ext: &str| destination.with_file_name(format!(".{name}.{id}.{ext}"));
        Self {
            relative_path: relative_path.to_string(),
            sibling_temp: sibling("tmp"),
            sibling_backup: sibling("bak"),
            replaces: destination.exists(),
            staged_source,
            destination,
        }
    }
}

/// Relative paths grouped by what the publish did to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub created: Vec<String>,
    pub replaced: Vec<String>,
    pub unchanged: Vec<String>,
}

impl PublishReport {
    pub fn writes(&self) -> usize {
        self.created.len() + self.replaced.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backup {
    /// Destination still in place; backup is a second link to it.
    Linked,
    /// Destination was moved to the backup path.
    Moved,
}

#[derive(Debug)]
enum Committed {
    Created,
    Replaced,
}

struct Txn<'a, O: ?Sized> {
    ops: &'a O,
    plans: Vec<StagingPlan>,
    created_dirs: Vec<PathBuf>,
    /// Index into `plans` and what the commit did.
    committed: Vec<(usize, Committed)>,
}

// ---------------------------------------------------------------------------
// publish
// ---------------------------------------------------------------------------

/// Publish `staged_root` into `final_root` with [`StdCommitOps`].
pub fn publish(
    listing: &Listing,
    staged_root: &Path,
    final_root: &Path,
) -> Result<PublishReport, SyncError> {
    publish_with(listing, staged_root, final_root, &StdCommitOps)
}

/// Publish through an explicit [`CommitOps`].
///
/// # Errors
/// - `ContractViolation` when the listing is truncated or `staged_root` does
///   not verify; nothing is touched
/// - `PublishFailed` when staging or commit fails; the final directory is
///   left as it was before the call
pub fn publish_with<O: CommitOps + ?Sized>(
    listing: &Listing,
    staged_root: &Path,
    final_root: &Path,
    ops: &O,
) -> Result<PublishReport, SyncError> {
    if listing.truncated {
        return Err(SyncError::ContractViolation(
            "refusing to publish a truncated listing".into(),
        ));
    }
    if !verify(listing, staged_root) {
        return Err(SyncError::ContractViolation(format!(
            "staging directory {} does not match the listing",
            staged_root.display()
        )));
    }

    let mut report = PublishReport::default();
    let mut txn = Txn {
        ops,
        plans: Vec::new(),
        created_dirs: Vec::new(),
        committed: Vec::new(),
    };
    for item in listing.blobs() {
        let destination = final_root.join(&item.native_path);
        if destination.is_file() && file_matches(&destination, &item.object_id) {
            tracing::debug!("unchanged: {}", destination.display());
            report.unchanged.push(item.relative_path.clone());
            continue;
        }
        txn.plans.push(StagingPlan::new(
            &item.relative_path,
            staged_root.join(&item.native_path),
            destination,
        ));
    }
    if txn.plans.is_empty() {
        return Ok(report);
    }

    if let Err((path, source)) = txn.stage_siblings() {
        txn.rollback();
        return Err(SyncError::PublishFailed { path, source });
    }
    if let Err((path, source)) = txn.commit_all() {
        tracing::error!("commit failed at {}: {source}; rolling back", path.display());
        txn.rollback();
        return Err(SyncError::PublishFailed { path, source });
    }

    for plan in &txn.plans {
        remove_if_present(ops, &plan.sibling_backup);
        if plan.replaces {
            report.replaced.push(plan.relative_path.clone());
        } else {
            report.created.push(plan.relative_path.clone());
        }
    }
    tracing::info!(
        "published into {}: {} created, {} replaced, {} unchanged",
        final_root.display(),
        report.created.len(),
        report.replaced.len(),
        report.unchanged.len()
    );
    Ok(report)
}

type StepError = (PathBuf, io::Error);

impl<O: CommitOps + ?Sized> Txn<'_, O> {
    /// Phase 1: copy staged content next to each destination.
    fn stage_siblings(&mut self) -> Result<(), StepError> {
        for i in 0..self.plans.len() {
            let destination = self.plans[i].destination.clone();
            if destination.is_dir() {
                return Err((
                    destination,
                    io::Error::other("destination is a directory"),
                ));
            }
            if let Some(parent) = destination.parent() {
                self.create_parents(parent)?;
            }
            let plan = &self.plans[i];
            self.ops
                .copy(&plan.staged_source, &plan.sibling_temp)
                .map_err(|e| (plan.sibling_temp.clone(), e))?;
        }
        Ok(())
    }

    fn create_parents(&mut self, dir: &Path) -> Result<(), StepError> {
        let missing: Vec<PathBuf> = dir
            .ancestors()
            .take_while(|d| !d.as_os_str().is_empty() && !d.exists())
            .map(Path::to_path_buf)
            .collect();
        for d in missing.into_iter().rev() {
            fs::create_dir(&d).map_err(|e| (d.clone(), e))?;
            self.created_dirs.push(d);
        }
        Ok(())
    }

    /// Phase 2: make each temp live, in listing order.
    fn commit_all(&mut self) -> Result<(), StepError> {
        for i in 0..self.plans.len() {
            let plan = &self.plans[i];
            if !plan.replaces {
                self.ops
                    .rename(&plan.sibling_temp, &plan.destination)
                    .map_err(|e| (plan.destination.clone(), e))?;
                self.committed.push((i, Committed::Created));
                continue;
            }

            let backup = match self.ops.hard_link(&plan.destination, &plan.sibling_backup) {
                Ok(()) => Backup::Linked,
                Err(e) => {
                    tracing::debug!(
                        "hard link unavailable for {} ({e}); moving instead",
                        plan.destination.display()
                    );
                    self.ops
                        .rename(&plan.destination, &plan.sibling_backup)
                        .map_err(|e| (plan.destination.clone(), e))?;
                    Backup::Moved
                }
            };
            if let Err(e) = self.ops.rename(&plan.sibling_temp, &plan.destination) {
                // Undo this item's half-step before reporting.
                match backup {
                    Backup::Linked => remove_if_present(self.ops, &plan.sibling_backup),
                    Backup::Moved => {
                        if let Err(re) = self.ops.rename(&plan.sibling_backup, &plan.destination) {
                            tracing::error!(
                                "could not restore {}: {re}",
                                plan.destination.display()
                            );
                        }
                    }
                }
                return Err((plan.destination.clone(), e));
            }
            self.committed.push((i, Committed::Replaced));
        }
        Ok(())
    }

    /// Undo every commit in reverse order and clear all side files.
    fn rollback(&mut self) {
        for (i, what) in self.committed.drain(..).rev() {
            let plan = &self.plans[i];
            let undone = match what {
                Committed::Created => self.ops.remove_file(&plan.destination),
                Committed::Replaced => self.ops.rename(&plan.sibling_backup, &plan.destination),
            };
            if let Err(e) = undone {
                tracing::error!("rollback of {} failed: {e}", plan.destination.display());
            }
        }
        for plan in &self.plans {
            remove_if_present(self.ops, &plan.sibling_temp);
            remove_if_present(self.ops, &plan.sibling_backup);
        }
        // Deepest first; a directory still holding foreign files stays.
        for dir in self.created_dirs.drain(..).rev() {
            let _ = fs::remove_dir(&dir);
        }
        tracing::warn!("publish rolled back");
    }
}

fn remove_if_present<O: CommitOps + ?Sized>(ops: &O, path: &Path) {
    match ops.remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("could not remove {}: {e}", path.display()),
    }
}
