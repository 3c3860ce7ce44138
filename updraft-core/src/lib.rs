//! updraft core library: domain types, local layout, configuration, errors.
//!
//! - [`types`]: remote items, listings, file metadata, batch outcomes
//! - [`layout`]: pure mapping from remote paths to local paths
//! - [`config`]: `~/.updraft/config.yaml` load / save / init
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod layout;
pub mod types;

pub use config::UpdraftConfig;
pub use error::ConfigError;
pub use layout::Layout;
pub use types::{
    DirectorySpec, FileAction, FileDescriptor, FileInfo, FileResult, HashAlgorithm, KindFilter,
    Listing, ObjectId, ObjectKind, Outcome, RemoteItem, RepoId,
};
