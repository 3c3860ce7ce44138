//! Subcommand implementations and the output helpers they share.

pub mod health;
pub mod init;
pub mod pull;
pub mod sync;
pub mod verify;

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use updraft_core::{config, FileAction, FileResult, Outcome, UpdraftConfig};
use updraft_remote::{GitHubClient, NetworkProbe, UreqTransport};
use updraft_sync::{BatchReport, BatchState};

/// Home directory plus the loaded config.
pub(crate) fn load_config() -> Result<(PathBuf, UpdraftConfig)> {
    let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
    let config = config::load_at(&home).context("failed to load config; run `updraft init` first")?;
    Ok((home, config))
}

pub(crate) fn client_for(config: &UpdraftConfig) -> GitHubClient<UreqTransport> {
    GitHubClient::from_config(config)
}

/// Probe sharing the client's timeouts but not its session.
pub(crate) fn probe_for(config: &UpdraftConfig) -> NetworkProbe<UreqTransport> {
    let transport = UreqTransport::new(config.connect_timeout(), config.request_timeout(), None);
    NetworkProbe::new(transport, &config.api_base, &config.raw_base, &config.probe_url)
}

#[derive(Serialize)]
pub(crate) struct ReportJson<'a> {
    pub label: &'a str,
    #[serde(flatten)]
    pub outcome: &'a Outcome,
    pub states: Vec<String>,
}

impl<'a> ReportJson<'a> {
    pub fn new(label: &'a str, report: &'a BatchReport) -> Self {
        Self {
            label,
            outcome: &report.outcome,
            states: report.states.iter().map(BatchState::to_string).collect(),
        }
    }
}

pub(crate) fn print_report(label: &str, report: &BatchReport) {
    match &report.outcome {
        Outcome::Updated { reason, files } => {
            println!("{} {label}: {reason}", "✓".green());
            print_files(files);
        }
        Outcome::LocalRun { reason } => {
            println!("{} {label}: running from local copy: {reason}", "!".yellow());
        }
        Outcome::Aborted { reason } => {
            println!("{} {label}: aborted: {reason}", "✗".red());
        }
    }
}

fn print_files(files: &[FileResult]) {
    for f in files {
        let marker = match f.action {
            FileAction::Downloaded => "+".green(),
            FileAction::Updated => "✎".cyan(),
            FileAction::Skipped => "·".dimmed(),
        };
        println!("  {marker}  {}", f.path.display());
    }
}
