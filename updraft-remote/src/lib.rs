//! # updraft-remote
//!
//! Everything that talks to the remote content store: the HTTP [`Transport`]
//! seam, URL building, listing and file-info resolution, and the preflight
//! checks run before a batch commits any resources.
//!
//! Call [`resolve_listing`] for a directory snapshot, [`resolve_file_info`]
//! for one file's latest commit, and the [`preflight`] functions to gate a
//! run on connectivity and API budget.

pub mod client;
pub mod error;
pub mod file_info;
pub mod listing;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod preflight;
pub mod transport;
pub mod urls;

pub use client::GitHubClient;
pub use error::RemoteError;
pub use file_info::resolve_file_info;
pub use listing::{resolve_listing, ListingRequest};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryTransport, RequestKind, ScriptedConnectivity};
pub use preflight::{
    check_budget, check_health, required_calls, required_calls_for_directory,
    wait_for_connectivity, ApiHealth, Connectivity, NetworkProbe, PreflightGate, WaitPolicy,
};
pub use transport::{HttpResponse, Transport, UreqTransport};
