//! Batch orchestration: preflight → resolve → stage/verify → publish.
//!
//! ## State machine
//!
//! ```text
//! Start → WaitingForConnectivity → CheckingHealth → ResolvingInfo → Saving → Updated
//!                 └───────────────────┴──────────────┴────────────┴→ (fallback) → LocalRun | Aborted
//! ```
//!
//! Everything is resolved before anything is written, so a resolution
//! failure never touches the local tree. Failures before a successful publish
//! fall back to the already-present local copy when `local_fallback` is set.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use updraft_core::{
    layout, DirectorySpec, FileAction, FileDescriptor, FileInfo, FileResult, HashAlgorithm,
    Listing, ObjectId, ObjectKind, Outcome, RemoteItem, UpdraftConfig,
};
use updraft_remote::{
    preflight, resolve_file_info, resolve_listing, Connectivity, GitHubClient, ListingRequest,
    PreflightGate, RemoteError, Transport, WaitPolicy,
};

use crate::branches;
use crate::error::{io_err, SyncError};
use crate::lock;
use crate::manifest::{self, Manifest};
use crate::provenance;
use crate::publish::{publish, PublishReport};
use crate::staging::{stage, stage_in, RetryPolicy, StagingDir};
use crate::verify::{compute_blob_id, verify};

// ---------------------------------------------------------------------------
// States + report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Start,
    WaitingForConnectivity,
    CheckingHealth,
    ResolvingInfo,
    Saving,
    Updated,
    LocalRun,
    Aborted,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Updated | BatchState::LocalRun | BatchState::Aborted)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Start => "start",
            BatchState::WaitingForConnectivity => "waiting-for-connectivity",
            BatchState::CheckingHealth => "checking-health",
            BatchState::ResolvingInfo => "resolving-info",
            BatchState::Saving => "saving",
            BatchState::Updated => "updated",
            BatchState::LocalRun => "local-run",
            BatchState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Outcome of one run plus every state it passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub outcome: Outcome,
    pub states: Vec<BatchState>,
}

struct Transitions {
    states: Vec<BatchState>,
}

impl Transitions {
    fn start() -> Self {
        tracing::debug!("batch: {}", BatchState::Start);
        Self {
            states: vec![BatchState::Start],
        }
    }

    fn enter(&mut self, next: BatchState) {
        if let Some(prev) = self.states.last() {
            tracing::debug!("batch: {prev} -> {next}");
        }
        self.states.push(next);
    }

    fn finish(mut self, outcome: Outcome) -> BatchReport {
        let terminal = match &outcome {
            Outcome::Updated { .. } => BatchState::Updated,
            Outcome::LocalRun { .. } => BatchState::LocalRun,
            Outcome::Aborted { .. } => BatchState::Aborted,
        };
        self.enter(terminal);
        match &outcome {
            Outcome::Aborted { reason } => tracing::error!("aborted: {reason}"),
            other => tracing::info!("{terminal}: {}", other.reason()),
        }
        BatchReport {
            outcome,
            states: self.states,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives file batches and directory syncs for one configuration.
pub struct BatchOrchestrator<'a, T> {
    client: &'a GitHubClient<T>,
    connectivity: &'a dyn Connectivity,
    config: &'a UpdraftConfig,
    home: PathBuf,
    retry: RetryPolicy,
    wait: WaitPolicy,
    staging_parent: Option<PathBuf>,
}

impl<'a, T: Transport> BatchOrchestrator<'a, T> {
    /// Retry and wait policies come from `config`; state (locks, manifests)
    /// lives under `home`.
    pub fn new(
        client: &'a GitHubClient<T>,
        connectivity: &'a dyn Connectivity,
        config: &'a UpdraftConfig,
        home: &Path,
    ) -> Self {
        Self {
            client,
            connectivity,
            config,
            home: home.to_path_buf(),
            retry: RetryPolicy {
                attempts: config.download_attempts,
                delay: config.retry_delay(),
            },
            wait: WaitPolicy {
                timeout: config.connectivity_timeout(),
                interval: config.connectivity_interval(),
            },
            staging_parent: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Stage under `parent` instead of the system temp directory.
    pub fn with_staging_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.staging_parent = Some(parent.into());
        self
    }

    // -----------------------------------------------------------------------
    // File batches
    // -----------------------------------------------------------------------

    /// Bring every descriptor's local copy under `config.root` up to date.
    pub fn sync_files(&self, descriptors: &[FileDescriptor]) -> BatchReport {
        let mut run = Transitions::start();
        let _lock = match lock::acquire_at(&self.home, &self.config.root) {
            Ok(lock) => lock,
            Err(e) => return run.finish(Outcome::Aborted { reason: e.to_string() }),
        };
        match self.update_files(&mut run, descriptors) {
            Ok(files) => {
                let written = files
                    .iter()
                    .filter(|f| f.action != FileAction::Skipped)
                    .count();
                let reason = format!(
                    "{written} file(s) written, {} up to date",
                    files.len() - written
                );
                run.finish(Outcome::Updated { reason, files })
            }
            Err(cause) => {
                let outcome = self.fall_back_files(descriptors, &cause);
                run.finish(outcome)
            }
        }
    }

    fn update_files(
        &self,
        run: &mut Transitions,
        descriptors: &[FileDescriptor],
    ) -> Result<Vec<FileResult>, SyncError> {
        let gate = PreflightGate::new(self.client, self.connectivity, self.wait);
        run.enter(BatchState::WaitingForConnectivity);
        gate.wait_for_connectivity()?;
        run.enter(BatchState::CheckingHealth);
        gate.ensure_budget(preflight::required_calls(descriptors))?;

        run.enter(BatchState::ResolvingInfo);
        let infos = descriptors
            .iter()
            .map(|d| resolve_file_info(self.client, d))
            .collect::<Result<Vec<_>, _>>()?;

        run.enter(BatchState::Saving);
        let results = self.save_files(&infos)?;

        let defaults = descriptors
            .iter()
            .zip(&infos)
            .filter(|(d, _)| d.reference.is_none())
            .map(|(_, i)| (i.owner.as_str(), i.repo.as_str(), i.branch.as_str()));
        if let Err(e) = branches::record_at(&self.home, defaults) {
            tracing::warn!("could not remember default branches: {e}");
        }
        Ok(results)
    }

    fn save_files(&self, infos: &[FileInfo]) -> Result<Vec<FileResult>, SyncError> {
        let root = &self.config.root;
        let tolerance = self.config.mtime_tolerance();
        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(infos.len());
        // (index into results, info, item to download)
        let mut pending: Vec<(usize, &FileInfo, RemoteItem)> = Vec::new();

        for info in infos {
            let relative = layout::root_relative_path(
                self.config.layout,
                &info.owner,
                &info.repo,
                &info.branch,
                &info.path,
            )
            .ok_or_else(|| RemoteError::InvalidPath {
                path: info.path.clone(),
            })?;
            if !seen.insert(relative.clone()) {
                tracing::debug!("duplicate entry for {relative}; ignoring");
                continue;
            }
            let native = layout::native_relative_path(&relative)
                .ok_or_else(|| RemoteError::InvalidPath { path: relative.clone() })?;
            let dest = root.join(&native);

            results.push(FileResult {
                path: dest.clone(),
                action: FileAction::Skipped,
            });
            if provenance::mtime_matches(&dest, info.last_commit_time, tolerance) {
                tracing::debug!("current: {}", dest.display());
                settle(&dest, Some(info.last_commit_time));
                continue;
            }
            pending.push((
                results.len() - 1,
                info,
                RemoteItem {
                    relative_path: relative,
                    native_path: native,
                    kind: ObjectKind::Blob,
                    object_id: ObjectId(String::new()),
                    size: 0,
                    mode: String::new(),
                    mutable_url: info.mutable_url.clone(),
                    pinned_url: Some(info.pinned_url.clone()),
                },
            ));
        }
        if pending.is_empty() {
            return Ok(results);
        }

        let mut listing = Listing {
            reference: String::new(),
            commit: String::new(),
            items: pending.iter().map(|(_, _, item)| item.clone()).collect(),
            truncated: false,
            committed_at: None,
        };
        let staged = self.stage(&listing)?;
        // Commit history carries no blob ids; take them from the staged bytes.
        for (item, path) in listing.items.iter_mut().zip(staged.files()) {
            let id = compute_blob_id(path, HashAlgorithm::Sha1).map_err(|e| io_err(path, e))?;
            item.size = std::fs::metadata(path).map_err(|e| io_err(path, e))?.len();
            item.object_id = ObjectId(id);
        }
        let report = publish(&listing, staged.path(), root)?;
        close_staging(staged);

        for (index, info, item) in pending {
            let result = &mut results[index];
            result.action = action_for(&report, &item.relative_path);
            settle(&result.path, Some(info.last_commit_time));
        }
        Ok(results)
    }

    fn fall_back_files(&self, descriptors: &[FileDescriptor], cause: &SyncError) -> Outcome {
        if !self.config.local_fallback {
            return Outcome::Aborted {
                reason: cause.to_string(),
            };
        }
        tracing::warn!("update failed ({cause}); checking local copies");
        let missing: Vec<String> = descriptors
            .iter()
            .filter(|d| {
                self.expected_local_path(d)
                    .map_or(true, |path| !path.is_file())
            })
            .map(|d| format!("{}/{}:{}", d.owner, d.repo, d.path))
            .collect();
        if missing.is_empty() {
            Outcome::LocalRun {
                reason: format!("{cause}; using local copies"),
            }
        } else {
            Outcome::Aborted {
                reason: format!(
                    "{cause}; {} local file(s) missing: {}",
                    missing.len(),
                    missing.join(", ")
                ),
            }
        }
    }

    /// Where `descriptor` lands locally, computed without the network.
    ///
    /// Without a ref, the branch is the one the last online run resolved,
    /// or `config.default_branch` before any online run.
    pub fn expected_local_path(&self, descriptor: &FileDescriptor) -> Option<PathBuf> {
        let branch = match &descriptor.reference {
            Some(reference) => reference.clone(),
            None => self.remembered_branch(descriptor),
        };
        layout::local_path(
            &self.config.root,
            self.config.layout,
            &descriptor.owner,
            &descriptor.repo,
            &branch,
            &descriptor.path,
        )
    }

    fn remembered_branch(&self, descriptor: &FileDescriptor) -> String {
        match branches::default_branch_at(&self.home, &descriptor.owner, &descriptor.repo) {
            Ok(Some(branch)) => branch,
            Ok(None) => self.config.default_branch.clone(),
            Err(e) => {
                tracing::warn!("remembered branches unreadable: {e}");
                self.config.default_branch.clone()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Directory syncs
    // -----------------------------------------------------------------------

    /// Mirror a remote directory into `spec.dest`.
    pub fn sync_directory(&self, spec: &DirectorySpec) -> BatchReport {
        let mut run = Transitions::start();
        let _lock = match lock::acquire_at(&self.home, &spec.dest) {
            Ok(lock) => lock,
            Err(e) => return run.finish(Outcome::Aborted { reason: e.to_string() }),
        };
        match self.update_directory(&mut run, spec) {
            Ok(files) => {
                let written = files
                    .iter()
                    .filter(|f| f.action != FileAction::Skipped)
                    .count();
                let reason = if written == 0 {
                    format!("{} already current", spec.dest.display())
                } else {
                    format!("{written} file(s) written to {}", spec.dest.display())
                };
                run.finish(Outcome::Updated { reason, files })
            }
            Err(cause) => {
                let outcome = self.fall_back_directory(spec, &cause);
                run.finish(outcome)
            }
        }
    }

    fn update_directory(
        &self,
        run: &mut Transitions,
        spec: &DirectorySpec,
    ) -> Result<Vec<FileResult>, SyncError> {
        let gate = PreflightGate::new(self.client, self.connectivity, self.wait);
        run.enter(BatchState::WaitingForConnectivity);
        gate.wait_for_connectivity()?;
        run.enter(BatchState::CheckingHealth);
        gate.ensure_budget(preflight::required_calls_for_directory(spec))?;

        run.enter(BatchState::ResolvingInfo);
        let listing = resolve_listing(self.client, &ListingRequest::from(spec))?;

        run.enter(BatchState::Saving);
        let results = if verify(&listing, &spec.dest) {
            tracing::debug!("{} matches {}", spec.dest.display(), listing.commit);
            listing
                .blobs()
                .map(|item| FileResult {
                    path: spec.dest.join(&item.native_path),
                    action: FileAction::Skipped,
                })
                .collect()
        } else {
            // No partial-skip at batch level: stage everything, let the
            // publisher leave matching files alone.
            let staged = self.stage(&listing)?;
            let report = publish(&listing, staged.path(), &spec.dest)?;
            close_staging(staged);
            let mut results = Vec::new();
            for item in listing.blobs() {
                let path = spec.dest.join(&item.native_path);
                let action = action_for(&report, &item.relative_path);
                if action != FileAction::Skipped {
                    settle(&path, listing.committed_at);
                }
                results.push(FileResult { path, action });
            }
            results
        };

        manifest::save_at(
            &self.home,
            &manifest::manifest_key(spec),
            &Manifest::from_listing(&listing, Utc::now()),
        )?;
        Ok(results)
    }

    fn fall_back_directory(&self, spec: &DirectorySpec, cause: &SyncError) -> Outcome {
        if !self.config.local_fallback {
            return Outcome::Aborted {
                reason: cause.to_string(),
            };
        }
        tracing::warn!("update failed ({cause}); checking last published manifest");
        match manifest::load_at(&self.home, &manifest::manifest_key(spec)) {
            Ok(Some(manifest)) => {
                let missing = manifest.missing_under(&spec.dest);
                if missing.is_empty() {
                    Outcome::LocalRun {
                        reason: format!(
                            "{cause}; using local copy of {} from {}",
                            manifest.commit, manifest.synced_at
                        ),
                    }
                } else {
                    Outcome::Aborted {
                        reason: format!(
                            "{cause}; {} local file(s) missing: {}",
                            missing.len(),
                            missing.join(", ")
                        ),
                    }
                }
            }
            Ok(None) => Outcome::Aborted {
                reason: format!("{cause}; no previous sync of {}", spec.dest.display()),
            },
            Err(e) => Outcome::Aborted {
                reason: format!("{cause}; manifest unreadable: {e}"),
            },
        }
    }

    fn stage(&self, listing: &Listing) -> Result<StagingDir, SyncError> {
        match &self.staging_parent {
            Some(parent) => stage_in(listing, self.client, self.retry, parent),
            None => stage(listing, self.client, self.retry),
        }
    }
}

fn action_for(report: &PublishReport, relative_path: &str) -> FileAction {
    if report.created.iter().any(|p| p == relative_path) {
        FileAction::Downloaded
    } else if report.replaced.iter().any(|p| p == relative_path) {
        FileAction::Updated
    } else {
        FileAction::Skipped
    }
}

/// Stamp a published file with its commit time and drop download
/// provenance. The file is already in place, so a failure here is logged
/// rather than failing the run.
fn settle(path: &Path, commit_time: Option<DateTime<Utc>>) -> bool {
    let settled = match commit_time {
        Some(time) => provenance::finalize(path, time),
        None => provenance::clear_provenance(path),
    };
    match settled {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("could not finalize {}: {e}", path.display());
            false
        }
    }
}

fn close_staging(staged: StagingDir) {
    if let Err(e) = staged.close() {
        tracing::warn!("staging cleanup failed: {e}");
    }
}
