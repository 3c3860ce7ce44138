//! Connectivity, API health and call-budget checks run before a batch.

use std::net::ToSocketAddrs;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use updraft_core::{DirectorySpec, FileDescriptor};

use crate::client::{classify, decode, rate_limited, unexpected, GitHubClient, StatusClass};
use crate::error::RemoteError;
use crate::transport::Transport;
use crate::urls;

/// A single reachability check.
pub trait Connectivity {
    fn check(&self) -> Result<(), RemoteError>;
}

/// DNS for the API and raw hosts, then one HTTP probe expecting 204/200.
#[derive(Debug)]
pub struct NetworkProbe<T> {
    transport: T,
    hosts: Vec<String>,
    probe_url: String,
}

impl<T: Transport> NetworkProbe<T> {
    pub fn new(transport: T, api_base: &str, raw_base: &str, probe_url: &str) -> Self {
        let hosts = [api_base, raw_base]
            .iter()
            .filter_map(|url| urls::host_of(url))
            .map(str::to_string)
            .collect();
        Self {
            transport,
            hosts,
            probe_url: probe_url.to_string(),
        }
    }
}

impl<T: Transport> Connectivity for NetworkProbe<T> {
    fn check(&self) -> Result<(), RemoteError> {
        for host in &self.hosts {
            resolve_host(host)?;
        }
        match self.transport.probe(&self.probe_url) {
            Ok(200 | 204) => Ok(()),
            Ok(status) => Err(RemoteError::NetworkUnavailable(format!(
                "probe {} answered HTTP {status}",
                self.probe_url
            ))),
            Err(err) => Err(RemoteError::NetworkUnavailable(format!(
                "probe {} failed: {err}",
                self.probe_url
            ))),
        }
    }
}

fn resolve_host(host: &str) -> Result<(), RemoteError> {
    let mut addrs = (host, 443)
        .to_socket_addrs()
        .map_err(|e| RemoteError::NetworkUnavailable(format!("cannot resolve {host}: {e}")))?;
    if addrs.next().is_none() {
        return Err(RemoteError::NetworkUnavailable(format!(
            "{host} resolved to no addresses"
        )));
    }
    Ok(())
}

/// Fixed-interval polling bounded by an overall timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

/// Poll `connectivity` until it succeeds or `policy.timeout` elapses.
///
/// At least one check is always made; a zero timeout means exactly one.
pub fn wait_for_connectivity(connectivity: &dyn Connectivity, policy: WaitPolicy) -> bool {
    let started = Instant::now();
    let mut attempt = 1u32;
    loop {
        match connectivity.check() {
            Ok(()) => return true,
            Err(err) => tracing::debug!("connectivity attempt {attempt} failed: {err}"),
        }
        if started.elapsed() + policy.interval > policy.timeout {
            return false;
        }
        thread::sleep(policy.interval);
        attempt += 1;
    }
}

// ---------------------------------------------------------------------------
// API health + budget
// ---------------------------------------------------------------------------

/// Remaining call budget as reported by the rate-limit endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiHealth {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: Option<DateTime<Utc>>,
}

impl ApiHealth {
    pub fn is_healthy(&self) -> bool {
        self.remaining > 0
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: Resources,
}

#[derive(Debug, Deserialize)]
struct Resources {
    core: CoreLimit,
}

#[derive(Debug, Deserialize)]
struct CoreLimit {
    limit: u64,
    remaining: u64,
    reset: i64,
}

/// Query the remaining call budget. Counts as one API call.
pub fn check_health<T: Transport>(client: &GitHubClient<T>) -> Result<ApiHealth, RemoteError> {
    let url = urls::rate_limit_url(client.api_base());
    let response = client.api_get(&url)?;
    match classify(response.status) {
        StatusClass::Success => {
            let body: RateLimitResponse = decode(&response)?;
            Ok(ApiHealth {
                limit: body.resources.core.limit,
                remaining: body.resources.core.remaining,
                reset_at: DateTime::from_timestamp(body.resources.core.reset, 0),
            })
        }
        StatusClass::RateLimited => Err(rate_limited(&response)),
        StatusClass::Missing | StatusClass::Other => Err(unexpected(&url, &response)),
    }
}

/// Calls a file batch needs: the health check, one commit lookup per file,
/// and one default-branch lookup per file without an explicit ref.
pub fn required_calls(descriptors: &[FileDescriptor]) -> u64 {
    1 + descriptors
        .iter()
        .map(|d| if d.reference.is_some() { 1 } else { 2 })
        .sum::<u64>()
}

/// Calls a directory listing needs: health, optional default branch, commit,
/// one per subpath segment, and the recursive tree.
pub fn required_calls_for_directory(spec: &DirectorySpec) -> u64 {
    let segments = spec
        .subpath
        .as_deref()
        .unwrap_or("")
        .split('/')
        .filter(|s| !s.is_empty())
        .count() as u64;
    let default_branch = u64::from(spec.reference.is_none());
    1 + default_branch + 1 + segments + 1
}

/// Fail unless `health` is healthy and covers `required` calls.
pub fn check_budget(health: &ApiHealth, required: u64) -> Result<(), RemoteError> {
    if !health.is_healthy() {
        return Err(RemoteError::RateLimited {
            reset_at: health.reset_at,
        });
    }
    if required > health.remaining {
        return Err(RemoteError::InsufficientBudget {
            required,
            remaining: health.remaining,
        });
    }
    Ok(())
}

/// Connectivity wait and API checks bundled for one run.
pub struct PreflightGate<'a, T> {
    client: &'a GitHubClient<T>,
    connectivity: &'a dyn Connectivity,
    wait: WaitPolicy,
}

impl<'a, T: Transport> PreflightGate<'a, T> {
    pub fn new(
        client: &'a GitHubClient<T>,
        connectivity: &'a dyn Connectivity,
        wait: WaitPolicy,
    ) -> Self {
        Self {
            client,
            connectivity,
            wait,
        }
    }

    pub fn wait_for_connectivity(&self) -> Result<(), RemoteError> {
        if wait_for_connectivity(self.connectivity, self.wait) {
            Ok(())
        } else {
            Err(RemoteError::NetworkUnavailable(format!(
                "no connectivity after {}s",
                self.wait.timeout.as_secs()
            )))
        }
    }

    /// Health check followed by the budget comparison.
    pub fn ensure_budget(&self, required: u64) -> Result<ApiHealth, RemoteError> {
        let health = check_health(self.client)?;
        tracing::debug!(
            "API budget {}/{} remaining, need {required}",
            health.remaining,
            health.limit
        );
        check_budget(&health, required)?;
        Ok(health)
    }
}
