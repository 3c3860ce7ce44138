//! Blocking HTTP transport seam and its `ureq` implementation.
//!
//! Resolvers only see [`Transport`]; status-code interpretation happens in
//! the callers because the same code means different things per endpoint.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use crate::error::{io_err, RemoteError};

/// Upper bound for API response bodies. Tree listings are the largest.
const MAX_API_BODY: u64 = 64 * 1024 * 1024;

const USER_AGENT: &str = concat!("updraft/", env!("CARGO_PKG_VERSION"));

/// A fully buffered API response. Non-2xx statuses are returned, not raised.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP operations the resolvers, stager and preflight gate need.
pub trait Transport {
    /// GET an API resource. Only connection-level failures are errors.
    fn get(&self, url: &str) -> Result<HttpResponse, RemoteError>;

    /// Stream a raw file into `dest` (truncating it). Non-2xx is an error.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, RemoteError>;

    /// Unauthenticated reachability probe; returns the status code.
    fn probe(&self, url: &str) -> Result<u16, RemoteError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> Result<HttpResponse, RemoteError> {
        (**self).get(url)
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64, RemoteError> {
        (**self).download(url, dest)
    }

    fn probe(&self, url: &str) -> Result<u16, RemoteError> {
        (**self).probe(url)
    }
}

// ---------------------------------------------------------------------------
// ureq
// ---------------------------------------------------------------------------

/// Production transport over a shared `ureq::Agent`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    token: Option<String>,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport")
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl UreqTransport {
    pub fn new(connect_timeout: Duration, request_timeout: Duration, token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build();
        Self { agent, token }
    }

    fn authorized(&self, url: &str) -> ureq::Request {
        let request = self.agent.get(url);
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }
}

fn call(request: ureq::Request) -> Result<ureq::Response, RemoteError> {
    match request.call() {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(_, response)) => Ok(response),
        Err(ureq::Error::Transport(err)) => Err(RemoteError::Transport(err.to_string())),
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, RemoteError> {
        let response = call(
            self.authorized(url)
                .set("Accept", "application/vnd.github+json")
                .set("X-GitHub-Api-Version", "2022-11-28"),
        )?;

        let status = response.status();
        let headers = response
            .headers_names()
            .into_iter()
            .filter_map(|name| {
                let value = response.header(&name)?.to_string();
                Some((name.to_ascii_lowercase(), value))
            })
            .collect();

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_API_BODY)
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Transport(format!("reading body of {url}: {e}")))?;

        tracing::debug!("GET {url} -> {status}");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64, RemoteError> {
        let response = call(self.authorized(url))?;
        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(RemoteError::Status {
                url: url.to_string(),
                status,
            });
        }

        let mut file = File::create(dest).map_err(|e| io_err(dest, e))?;
        let mut reader = response.into_reader();
        let written = io::copy(&mut reader, &mut file).map_err(|e| {
            if e.kind() == io::ErrorKind::Other || e.kind() == io::ErrorKind::TimedOut {
                RemoteError::Transport(format!("downloading {url}: {e}"))
            } else {
                io_err(dest, e)
            }
        })?;
        file.sync_all().map_err(|e| io_err(dest, e))?;
        tracing::debug!("downloaded {written} bytes from {url}");
        Ok(written)
    }

    fn probe(&self, url: &str) -> Result<u16, RemoteError> {
        let response = call(self.agent.get(url))?;
        Ok(response.status())
    }
}
