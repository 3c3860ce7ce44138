//! Resolve a repository ref (and optional subpath) into a flat [`Listing`].
//!
//! Call sequence:
//!
//! 1. default branch (only when no ref is given)
//! 2. ref → commit → root tree
//! 3. one non-recursive tree lookup per subpath segment
//! 4. one recursive lookup of the target tree
//!
//! A truncated response at step 4 is always an error; a partial listing is
//! never returned.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use updraft_core::{
    layout, DirectorySpec, KindFilter, Listing, ObjectId, ObjectKind, RemoteItem,
};

use crate::client::{
    classify, commit_date, decode, rate_limited, unexpected, GitHubClient, Signature, StatusClass,
};
use crate::error::RemoteError;
use crate::transport::Transport;
use crate::urls;

/// What to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub owner: String,
    pub repo: String,
    pub reference: Option<String>,
    pub subpath: Option<String>,
    pub kind_filter: KindFilter,
}

impl ListingRequest {
    pub fn new(owner: &str, repo: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            reference: None,
            subpath: None,
            kind_filter: KindFilter::Blobs,
        }
    }

    pub fn reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn subpath(mut self, subpath: &str) -> Self {
        self.subpath = Some(subpath.to_string());
        self
    }

    pub fn kinds(mut self, kind_filter: KindFilter) -> Self {
        self.kind_filter = kind_filter;
        self
    }

    /// Non-empty subpath segments, in order.
    pub fn subpath_segments(&self) -> Vec<&str> {
        self.subpath
            .as_deref()
            .unwrap_or("")
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl From<&DirectorySpec> for ListingRequest {
    fn from(spec: &DirectorySpec) -> Self {
        Self {
            owner: spec.owner.clone(),
            repo: spec.repo.clone(),
            reference: spec.reference.clone(),
            subpath: spec.subpath.clone(),
            kind_filter: KindFilter::Blobs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    commit: CommitBody,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    tree: ShaRef,
    #[serde(default)]
    author: Option<Signature>,
    #[serde(default)]
    committer: Option<Signature>,
}

#[derive(Debug, Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    sha: String,
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(default)]
    mode: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

impl TreeEntry {
    fn object_kind(&self) -> Option<ObjectKind> {
        match self.kind.as_str() {
            "blob" => Some(ObjectKind::Blob),
            "tree" => Some(ObjectKind::Tree),
            // Submodule pointers ("commit") have no content to fetch.
            _ => None,
        }
    }
}

/// Resolve `request` into a listing of the target tree.
pub fn resolve_listing<T: Transport>(
    client: &GitHubClient<T>,
    request: &ListingRequest,
) -> Result<Listing, RemoteError> {
    let owner = request.owner.as_str();
    let repo = request.repo.as_str();

    let reference = match &request.reference {
        Some(reference) => reference.clone(),
        None => client.default_branch(owner, repo)?,
    };
    let ResolvedCommit {
        sha: commit,
        root_tree,
        committed_at,
    } = resolve_commit(client, owner, repo, &reference)?;

    let mut tree = root_tree;
    let mut walked: Vec<&str> = Vec::new();
    for segment in request.subpath_segments() {
        tree = find_subtree(client, owner, repo, &tree, segment, &walked, &reference)?;
        walked.push(segment);
    }
    let prefix = walked.join("/");

    let url = urls::tree_url(client.api_base(), owner, repo, &tree, true);
    let listed: TreeResponse = fetch_tree(client, &url, owner, repo, &tree)?;
    if listed.truncated {
        tracing::warn!("tree {} of {owner}/{repo} came back truncated", listed.sha);
        return Err(RemoteError::Truncated { tree: listed.sha });
    }

    let mut items = Vec::with_capacity(listed.tree.len());
    for entry in listed.tree {
        let Some(kind) = entry.object_kind() else {
            tracing::debug!("skipping {} entry {}", entry.kind, entry.path);
            continue;
        };
        if !request.kind_filter.accepts(kind) {
            continue;
        }
        let native_path = layout::native_relative_path(&entry.path).ok_or_else(|| {
            RemoteError::InvalidPath {
                path: entry.path.clone(),
            }
        })?;
        let repo_path = if prefix.is_empty() {
            entry.path.clone()
        } else {
            format!("{prefix}/{}", entry.path)
        };
        items.push(RemoteItem {
            mutable_url: urls::raw_url(client.raw_base(), owner, repo, &reference, &repo_path),
            pinned_url: Some(urls::raw_url(client.raw_base(), owner, repo, &commit, &repo_path)),
            relative_path: entry.path,
            native_path,
            kind,
            object_id: ObjectId(entry.sha),
            size: entry.size.unwrap_or(0),
            mode: entry.mode,
        });
    }

    tracing::info!(
        "resolved {owner}/{repo}@{reference} ({commit}){}: {} item(s)",
        if prefix.is_empty() { String::new() } else { format!(" under {prefix}") },
        items.len()
    );
    Ok(Listing {
        reference,
        commit,
        items,
        truncated: false,
        committed_at,
    })
}

struct ResolvedCommit {
    sha: String,
    root_tree: String,
    committed_at: Option<DateTime<Utc>>,
}

fn resolve_commit<T: Transport>(
    client: &GitHubClient<T>,
    owner: &str,
    repo: &str,
    reference: &str,
) -> Result<ResolvedCommit, RemoteError> {
    let url = urls::commit_url(client.api_base(), owner, repo, reference);
    let response = client.api_get(&url)?;
    match classify(response.status) {
        StatusClass::Success => {
            let CommitResponse { sha, commit } = decode(&response)?;
            Ok(ResolvedCommit {
                sha,
                root_tree: commit.tree.sha,
                committed_at: commit_date(commit.author.as_ref(), commit.committer.as_ref()),
            })
        }
        StatusClass::RateLimited => Err(rate_limited(&response)),
        StatusClass::Missing => Err(RemoteError::NotFound {
            what: format!("ref '{reference}' in {owner}/{repo}"),
        }),
        StatusClass::Other => Err(unexpected(&url, &response)),
    }
}

fn fetch_tree<T: Transport>(
    client: &GitHubClient<T>,
    url: &str,
    owner: &str,
    repo: &str,
    sha: &str,
) -> Result<TreeResponse, RemoteError> {
    let response = client.api_get(url)?;
    match classify(response.status) {
        StatusClass::Success => decode(&response),
        StatusClass::RateLimited => Err(rate_limited(&response)),
        StatusClass::Missing => Err(RemoteError::NotFound {
            what: format!("tree {sha} in {owner}/{repo}"),
        }),
        StatusClass::Other => Err(unexpected(url, &response)),
    }
}

fn find_subtree<T: Transport>(
    client: &GitHubClient<T>,
    owner: &str,
    repo: &str,
    tree: &str,
    segment: &str,
    walked: &[&str],
    reference: &str,
) -> Result<String, RemoteError> {
    let url = urls::tree_url(client.api_base(), owner, repo, tree, false);
    let listed = fetch_tree(client, &url, owner, repo, tree)?;
    let found = listed
        .tree
        .iter()
        .find(|entry| entry.path == segment && entry.object_kind() == Some(ObjectKind::Tree));
    match found {
        Some(entry) => Ok(entry.sha.clone()),
        // The entry may sit past the cut-off; absence proves nothing.
        None if listed.truncated => Err(RemoteError::Truncated { tree: listed.sha }),
        None => {
            let mut path = walked.to_vec();
            path.push(segment);
            Err(RemoteError::NotFound {
                what: format!(
                    "directory '{}' in {owner}/{repo}@{reference}",
                    path.join("/")
                ),
            })
        }
    }
}
