//! Long-lived session over a [`Transport`]: base URLs, call accounting and
//! the last transport failure.

use std::cell::Cell;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use updraft_core::UpdraftConfig;

use crate::error::RemoteError;
use crate::transport::{HttpResponse, Transport, UreqTransport};
use crate::urls;

/// How an endpoint's status code should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Success,
    RateLimited,
    /// 404, or 422 which the API uses for unknown shas.
    Missing,
    Other,
}

pub(crate) fn classify(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        403 | 429 => StatusClass::RateLimited,
        404 | 422 => StatusClass::Missing,
        _ => StatusClass::Other,
    }
}

pub(crate) fn decode<D: DeserializeOwned>(response: &HttpResponse) -> Result<D, RemoteError> {
    Ok(serde_json::from_slice(&response.body)?)
}

/// Build [`RemoteError::RateLimited`] from the `x-ratelimit-reset` header.
pub(crate) fn rate_limited(response: &HttpResponse) -> RemoteError {
    let reset_at = response
        .header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    RemoteError::RateLimited { reset_at }
}

pub(crate) fn unexpected(url: &str, response: &HttpResponse) -> RemoteError {
    RemoteError::Status {
        url: url.to_string(),
        status: response.status,
    }
}

/// `author` / `committer` block of a commit object.
#[derive(Debug, Deserialize)]
pub(crate) struct Signature {
    pub date: Option<DateTime<Utc>>,
}

/// Author date, falling back to the committer date.
pub(crate) fn commit_date(
    author: Option<&Signature>,
    committer: Option<&Signature>,
) -> Option<DateTime<Utc>> {
    author
        .and_then(|s| s.date)
        .or_else(|| committer.and_then(|s| s.date))
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    default_branch: String,
}

/// Client session against one API host and one raw-content host.
///
/// Single-threaded by construction: counters use `Cell`.
#[derive(Debug)]
pub struct GitHubClient<T> {
    transport: T,
    api_base: String,
    raw_base: String,
    api_calls: Cell<u64>,
    last_failure: Cell<Option<DateTime<Utc>>>,
}

impl GitHubClient<UreqTransport> {
    /// Production client with timeouts and token from `config`.
    pub fn from_config(config: &UpdraftConfig) -> Self {
        let transport = UreqTransport::new(
            config.connect_timeout(),
            config.request_timeout(),
            config.resolve_token(),
        );
        Self::new(transport, &config.api_base, &config.raw_base)
    }
}

impl<T: Transport> GitHubClient<T> {
    pub fn new(transport: T, api_base: &str, raw_base: &str) -> Self {
        Self {
            transport,
            api_base: api_base.trim_end_matches('/').to_string(),
            raw_base: raw_base.trim_end_matches('/').to_string(),
            api_calls: Cell::new(0),
            last_failure: Cell::new(None),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn raw_base(&self) -> &str {
        &self.raw_base
    }

    /// API calls issued by this session (downloads and probes excluded).
    pub fn api_calls(&self) -> u64 {
        self.api_calls.get()
    }

    /// When the transport last failed at connection level, if ever.
    pub fn last_failure(&self) -> Option<DateTime<Utc>> {
        self.last_failure.get()
    }

    pub(crate) fn api_get(&self, url: &str) -> Result<HttpResponse, RemoteError> {
        self.api_calls.set(self.api_calls.get() + 1);
        self.transport.get(url).inspect_err(|_| self.note_failure())
    }

    /// Download a raw file into `dest`.
    pub fn download(&self, url: &str, dest: &Path) -> Result<u64, RemoteError> {
        self.transport.download(url, dest).inspect_err(|err| {
            if err.is_retryable() {
                self.note_failure();
            }
        })
    }

    /// Resolve the repository's default branch name.
    pub fn default_branch(&self, owner: &str, repo: &str) -> Result<String, RemoteError> {
        let url = urls::repo_url(&self.api_base, owner, repo);
        let response = self.api_get(&url)?;
        match classify(response.status) {
            StatusClass::Success => Ok(decode::<RepoResponse>(&response)?.default_branch),
            StatusClass::RateLimited => Err(rate_limited(&response)),
            StatusClass::Missing => Err(RemoteError::NotFound {
                what: format!("repository {owner}/{repo}"),
            }),
            StatusClass::Other => Err(unexpected(&url, &response)),
        }
    }

    fn note_failure(&self) {
        self.last_failure.set(Some(Utc::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use serde_json::json;

    const API: &str = "https://api.test";
    const RAW: &str = "https://raw.test";

    #[test]
    fn default_branch_decodes_repo() {
        let transport = MemoryTransport::new().with_json(
            "https://api.test/repos/octo/widgets",
            200,
            json!({ "default_branch": "trunk" }),
        );
        let client = GitHubClient::new(transport, API, RAW);
        assert_eq!(client.default_branch("octo", "widgets").expect("branch"), "trunk");
        assert_eq!(client.api_calls(), 1);
    }

    #[test]
    fn default_branch_missing_repo_is_not_found() {
        let client = GitHubClient::new(MemoryTransport::new(), API, RAW);
        let err = client.default_branch("octo", "ghost").unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { .. }), "got: {err}");
    }

    #[test]
    fn forbidden_maps_to_rate_limited_with_reset() {
        let transport = MemoryTransport::new().with_response(
            "https://api.test/repos/octo/widgets",
            HttpResponse {
                status: 403,
                headers: [("x-ratelimit-reset".to_string(), "1700000000".to_string())]
                    .into_iter()
                    .collect(),
                body: b"{}".to_vec(),
            },
        );
        let client = GitHubClient::new(transport, API, RAW);
        match client.default_branch("octo", "widgets").unwrap_err() {
            RemoteError::RateLimited { reset_at } => {
                assert_eq!(reset_at.map(|t| t.timestamp()), Some(1_700_000_000));
            }
            other => panic!("expected rate limited, got {other:?}"),
        }
    }

    #[test]
    fn transport_failure_is_recorded_on_session() {
        let transport = MemoryTransport::new().offline();
        let client = GitHubClient::new(transport, API, RAW);
        assert!(client.last_failure().is_none());
        let err = client.default_branch("octo", "widgets").unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
        assert!(client.last_failure().is_some());
    }

    #[test]
    fn bases_are_trimmed() {
        let client = GitHubClient::new(MemoryTransport::new(), "https://api.test/", "https://raw.test//");
        assert_eq!(client.api_base(), API);
        assert_eq!(client.raw_base(), RAW);
    }
}
