//! # updraft-sync
//!
//! Integrity-checked, all-or-nothing sync of remote files into a local tree.
//!
//! Call [`BatchOrchestrator::sync_files`] for a batch of individual files, or
//! [`BatchOrchestrator::sync_directory`] to mirror a remote directory. The
//! building blocks ([`verify`], [`stage`], [`publish`]) are usable on their own.

pub mod branches;
pub mod error;
pub mod lock;
pub mod manifest;
pub mod orchestrator;
pub mod provenance;
pub mod publish;
pub mod staging;
pub mod verify;

pub use error::SyncError;
pub use manifest::Manifest;
pub use orchestrator::{BatchOrchestrator, BatchReport, BatchState};
pub use publish::{publish, publish_with, CommitOps, PublishReport, StagingPlan, StdCommitOps};
pub use staging::{stage, stage_in, RetryPolicy, StagingDir};
pub use verify::{blob_id_of_bytes, compute_blob_id, verify};
