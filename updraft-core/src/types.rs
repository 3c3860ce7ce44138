//! Domain types shared by the resolver, sync and CLI crates.
//!
//! Remote paths are always slash-separated `String`s; local paths are
//! `PathBuf`. The two only meet through [`crate::layout`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Repository identity
// ---------------------------------------------------------------------------

/// `owner/repo` pair identifying a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(Self::new(owner, repo))
            }
            _ => Err(format!("expected '<owner>/<repo>', got '{s}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// Kind of a node in the remote content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Blob => write!(f, "blob"),
            ObjectKind::Tree => write!(f, "tree"),
        }
    }
}

/// Which entry kinds a listing keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindFilter {
    #[default]
    Blobs,
    Trees,
    All,
}

impl KindFilter {
    pub fn accepts(self, kind: ObjectKind) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Blobs => kind == ObjectKind::Blob,
            KindFilter::Trees => kind == ObjectKind::Tree,
        }
    }
}

/// Hash function behind an object id, selected by the id's hex length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// 40 hex chars → SHA-1, 64 → SHA-256, anything else is unknown.
    pub fn for_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(HashAlgorithm::Sha1),
            64 => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }
}

/// Hex-encoded content object id (`"blob <size>\0<content>"` digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        if !self.0.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        HashAlgorithm::for_hex_len(self.0.len())
    }

    /// Case-insensitive comparison against a computed hex digest.
    pub fn matches(&self, hex_digest: &str) -> bool {
        self.0.eq_ignore_ascii_case(hex_digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// One entry of a remote tree, flattened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Slash-separated path relative to the listing root.
    pub relative_path: String,
    /// `relative_path` with native separators.
    pub native_path: PathBuf,
    pub kind: ObjectKind,
    pub object_id: ObjectId,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mode: String,
    /// Branch-addressed download location.
    pub mutable_url: String,
    /// Commit-addressed download location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_url: Option<String>,
}

impl RemoteItem {
    /// Pinned URL when available, otherwise the mutable one.
    pub fn download_url(&self) -> &str {
        self.pinned_url.as_deref().unwrap_or(&self.mutable_url)
    }

    pub fn is_blob(&self) -> bool {
        self.kind == ObjectKind::Blob
    }
}

/// Ordered, flat result of resolving a remote tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Ref name the listing was resolved from (branch, tag or sha).
    pub reference: String,
    /// Commit the ref pointed at.
    pub commit: String,
    pub items: Vec<RemoteItem>,
    #[serde(default)]
    pub truncated: bool,
    /// Author date of `commit` (committer date when absent).
    #[serde(default)]
    pub committed_at: Option<DateTime<Utc>>,
}

impl Listing {
    pub fn blobs(&self) -> impl Iterator<Item = &RemoteItem> {
        self.items.iter().filter(|item| item.is_blob())
    }
}

// ---------------------------------------------------------------------------
// Batch inputs
// ---------------------------------------------------------------------------

/// A single remote file requested by a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub owner: String,
    pub repo: String,
    /// Slash-separated path inside the repository.
    pub path: String,
    /// Branch, tag or commit. `None` means the default branch.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl FileDescriptor {
    pub fn new(owner: &str, repo: &str, path: &str, reference: Option<&str>) -> Self {
        Self {
            owner: owner.to_owned(),
            repo: repo.to_owned(),
            path: path.to_owned(),
            reference: reference.map(str::to_owned),
        }
    }
}

/// A remote directory mirrored into `dest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySpec {
    pub owner: String,
    pub repo: String,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
    pub dest: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved metadata
// ---------------------------------------------------------------------------

/// Latest-commit metadata for one remote file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub owner: String,
    pub repo: String,
    pub path: String,
    /// Explicit ref, or the resolved default branch.
    pub branch: String,
    /// Authoritative for local freshness comparisons.
    pub last_commit_time: DateTime<Utc>,
    pub commit_id: String,
    pub mutable_url: String,
    pub pinned_url: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub api_url: String,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one file in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    /// Local copy already current.
    Skipped,
    /// File did not exist locally and was created.
    Downloaded,
    /// Existing file was replaced.
    Updated,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileAction::Skipped => write!(f, "skipped"),
            FileAction::Downloaded => write!(f, "downloaded"),
            FileAction::Updated => write!(f, "updated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    pub path: PathBuf,
    pub action: FileAction,
}

/// Terminal result of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Updated { reason: String, files: Vec<FileResult> },
    LocalRun { reason: String },
    Aborted { reason: String },
}

impl Outcome {
    pub fn reason(&self) -> &str {
        match self {
            Outcome::Updated { reason, .. }
            | Outcome::LocalRun { reason }
            | Outcome::Aborted { reason } => reason,
        }
    }

    /// `Updated` and `LocalRun` both leave a usable local tree.
    pub fn is_usable(&self) -> bool {
        !matches!(self, Outcome::Aborted { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_id_parse_and_display() {
        let id: RepoId = "octo/widgets".parse().expect("parse");
        assert_eq!(id, RepoId::new("octo", "widgets"));
        assert_eq!(id.to_string(), "octo/widgets");
        assert!("octo".parse::<RepoId>().is_err());
        assert!("octo/a/b".parse::<RepoId>().is_err());
        assert!("/widgets".parse::<RepoId>().is_err());
    }

    #[test]
    fn object_id_algorithm_follows_length() {
        let sha1 = ObjectId::from("a".repeat(40));
        let sha256 = ObjectId::from("b".repeat(64));
        assert_eq!(sha1.algorithm(), Some(HashAlgorithm::Sha1));
        assert_eq!(sha256.algorithm(), Some(HashAlgorithm::Sha256));
        assert_eq!(ObjectId::from("abc").algorithm(), None);
        assert_eq!(ObjectId::from("z".repeat(40)).algorithm(), None);
    }

    #[test]
    fn object_id_matches_ignores_case() {
        let id = ObjectId::from("ABCDEF0123456789ABCDEF0123456789ABCDEF01");
        assert!(id.matches("abcdef0123456789abcdef0123456789abcdef01"));
        assert!(!id.matches("abcdef0123456789abcdef0123456789abcdef02"));
    }

    #[test]
    fn kind_filter_accepts() {
        assert!(KindFilter::Blobs.accepts(ObjectKind::Blob));
        assert!(!KindFilter::Blobs.accepts(ObjectKind::Tree));
        assert!(KindFilter::Trees.accepts(ObjectKind::Tree));
        assert!(KindFilter::All.accepts(ObjectKind::Blob));
    }

    #[test]
    fn download_url_prefers_pinned() {
        let mut item = RemoteItem {
            relative_path: "a.txt".into(),
            native_path: PathBuf::from("a.txt"),
            kind: ObjectKind::Blob,
            object_id: ObjectId::from("0".repeat(40)),
            size: 0,
            mode: "100644".into(),
            mutable_url: "https://raw/main/a.txt".into(),
            pinned_url: Some("https://raw/abc/a.txt".into()),
        };
        assert_eq!(item.download_url(), "https://raw/abc/a.txt");
        item.pinned_url = None;
        assert_eq!(item.download_url(), "https://raw/main/a.txt");
    }

    #[test]
    fn descriptor_ref_serializes_as_ref() {
        let d = FileDescriptor::new("octo", "widgets", "bin/tool", Some("v1"));
        let yaml = serde_yaml::to_string(&d).expect("serialize");
        assert!(yaml.contains("ref: v1"));
        let back: FileDescriptor = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, d);
    }

    #[test]
    fn outcome_reason_and_usability() {
        let aborted = Outcome::Aborted { reason: "offline".into() };
        assert_eq!(aborted.reason(), "offline");
        assert!(!aborted.is_usable());
        assert!(Outcome::LocalRun { reason: "cached".into() }.is_usable());
    }
}
