//! Resolve latest-commit metadata for a single remote file.

use serde::Deserialize;

use updraft_core::{FileDescriptor, FileInfo};

use crate::client::{
    classify, commit_date, decode, rate_limited, unexpected, GitHubClient, Signature, StatusClass,
};
use crate::error::RemoteError;
use crate::transport::Transport;
use crate::urls;

#[derive(Debug, Deserialize)]
struct CommitEntry {
    sha: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    url: String,
    commit: CommitBody,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    #[serde(default)]
    message: String,
    author: Option<Signature>,
    committer: Option<Signature>,
}

/// Find the most recent commit touching `descriptor.path`.
///
/// Costs one API call, plus one more to resolve the default branch when the
/// descriptor has no explicit ref.
///
/// # Errors
/// - `RateLimited` on HTTP 403/429
/// - `BadReference` on HTTP 404/422
/// - `NotFound` when the path has no commit history
pub fn resolve_file_info<T: Transport>(
    client: &GitHubClient<T>,
    descriptor: &FileDescriptor,
) -> Result<FileInfo, RemoteError> {
    let FileDescriptor {
        owner,
        repo,
        path,
        reference,
    } = descriptor;

    let url = urls::path_commits_url(client.api_base(), owner, repo, path, reference.as_deref());
    let response = client.api_get(&url)?;
    let mut commits: Vec<CommitEntry> = match classify(response.status) {
        StatusClass::Success => decode(&response)?,
        StatusClass::RateLimited => return Err(rate_limited(&response)),
        StatusClass::Missing => {
            return Err(RemoteError::BadReference {
                reference: reference
                    .clone()
                    .unwrap_or_else(|| format!("{owner}/{repo} (default branch)")),
            })
        }
        StatusClass::Other => return Err(unexpected(&url, &response)),
    };
    if commits.is_empty() {
        return Err(RemoteError::NotFound {
            what: format!(
                "{owner}/{repo}:{path}@{}",
                reference.as_deref().unwrap_or("default branch")
            ),
        });
    }
    let latest = commits.swap_remove(0);

    let last_commit_time = commit_date(
        latest.commit.author.as_ref(),
        latest.commit.committer.as_ref(),
    )
    .ok_or_else(|| {
        RemoteError::Decode(serde::de::Error::custom(format!(
            "commit {} has neither author nor committer date",
            latest.sha
        )))
    })?;

    let branch = match reference {
        Some(reference) => reference.clone(),
        None => client.default_branch(owner, repo)?,
    };

    tracing::debug!(
        "{owner}/{repo}:{path}@{branch} last changed in {} at {last_commit_time}",
        latest.sha
    );
    Ok(FileInfo {
        owner: owner.clone(),
        repo: repo.clone(),
        path: path.clone(),
        mutable_url: urls::raw_url(client.raw_base(), owner, repo, &branch, path),
        pinned_url: urls::raw_url(client.raw_base(), owner, repo, &latest.sha, path),
        branch,
        last_commit_time,
        commit_id: latest.sha,
        message: latest.commit.message,
        html_url: latest.html_url,
        api_url: latest.url,
    })
}
