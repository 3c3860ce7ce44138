//! In-memory [`Transport`] and [`Connectivity`] implementations.
//!
//! Canned responses keyed by exact URL. Every request is recorded so callers
//! can assert on what (and how much) was asked of the network.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{io_err, RemoteError};
use crate::preflight::Connectivity;
use crate::transport::{HttpResponse, Transport};

/// Which operation a recorded request used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Get,
    Download,
    Probe,
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    responses: HashMap<String, HttpResponse>,
    files: HashMap<String, Vec<u8>>,
    /// Remaining forced failures per download URL.
    download_failures: RefCell<HashMap<String, u32>>,
    probe_status: u16,
    offline: bool,
    log: RefCell<Vec<(RequestKind, String)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            probe_status: 204,
            ..Self::default()
        }
    }

    pub fn with_response(mut self, url: &str, response: HttpResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    pub fn with_json(self, url: &str, status: u16, body: serde_json::Value) -> Self {
        self.with_response(
            url,
            HttpResponse {
                status,
                headers: Default::default(),
                body: body.to_string().into_bytes(),
            },
        )
    }

    pub fn with_file(mut self, url: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(url.to_string(), content.into());
        self
    }

    /// Make the next `times` downloads of `url` fail with a transport error.
    pub fn fail_downloads(self, url: &str, times: u32) -> Self {
        self.download_failures
            .borrow_mut()
            .insert(url.to_string(), times);
        self
    }

    pub fn with_probe_status(mut self, status: u16) -> Self {
        self.probe_status = status;
        self
    }

    /// Every operation fails as if the network were down.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn requests(&self) -> Vec<(RequestKind, String)> {
        self.log.borrow().clone()
    }

    pub fn count(&self, kind: RequestKind) -> usize {
        self.log.borrow().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn total_requests(&self) -> usize {
        self.log.borrow().len()
    }

    fn record(&self, kind: RequestKind, url: &str) -> Result<(), RemoteError> {
        self.log.borrow_mut().push((kind, url.to_string()));
        if self.offline {
            return Err(RemoteError::Transport(format!("offline: {url}")));
        }
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, RemoteError> {
        self.record(RequestKind::Get, url)?;
        Ok(self.responses.get(url).cloned().unwrap_or_else(|| HttpResponse {
            status: 404,
            headers: Default::default(),
            body: br#"{"message":"Not Found"}"#.to_vec(),
        }))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64, RemoteError> {
        self.record(RequestKind::Download, url)?;
        if let Some(remaining) = self.download_failures.borrow_mut().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Transport(format!("connection reset: {url}")));
            }
        }
        let Some(content) = self.files.get(url) else {
            return Err(RemoteError::Status {
                url: url.to_string(),
                status: 404,
            });
        };
        std::fs::write(dest, content).map_err(|e| io_err(dest, e))?;
        Ok(content.len() as u64)
    }

    fn probe(&self, url: &str) -> Result<u16, RemoteError> {
        self.record(RequestKind::Probe, url)?;
        Ok(self.probe_status)
    }
}

/// Connectivity that answers from a script: one entry per check, the last
/// entry repeating forever.
#[derive(Debug)]
pub struct ScriptedConnectivity {
    script: Vec<bool>,
    checks: Cell<usize>,
}

impl ScriptedConnectivity {
    pub fn online() -> Self {
        Self::script(vec![true])
    }

    pub fn offline() -> Self {
        Self::script(vec![false])
    }

    pub fn script(script: Vec<bool>) -> Self {
        Self {
            script,
            checks: Cell::new(0),
        }
    }

    pub fn checks(&self) -> usize {
        self.checks.get()
    }
}

impl Connectivity for ScriptedConnectivity {
    fn check(&self) -> Result<(), RemoteError> {
        let n = self.checks.get();
        self.checks.set(n + 1);
        let online = self
            .script
            .get(n)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(false);
        if online {
            Ok(())
        } else {
            Err(RemoteError::NetworkUnavailable("scripted offline".into()))
        }
    }
}
