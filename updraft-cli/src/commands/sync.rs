//! `updraft sync`: run every configured file batch and directory sync.

use anyhow::{bail, Result};
use clap::Args;

use updraft_sync::BatchOrchestrator;

use super::{client_for, load_config, print_report, probe_for, ReportJson};

/// Arguments for `updraft sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Only the `files` batch.
    #[arg(long, conflicts_with = "dirs_only")]
    pub files_only: bool,

    /// Only the `directories` entries.
    #[arg(long)]
    pub dirs_only: bool,

    /// Fail instead of falling back to local copies.
    #[arg(long)]
    pub no_fallback: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let (home, mut config) = load_config()?;
        if self.no_fallback {
            config.local_fallback = false;
        }
        let client = client_for(&config);
        let probe = probe_for(&config);
        let orchestrator = BatchOrchestrator::new(&client, &probe, &config, &home);

        let mut reports = Vec::new();
        if !self.dirs_only && !config.files.is_empty() {
            reports.push(("files".to_string(), orchestrator.sync_files(&config.files)));
        }
        if !self.files_only {
            for spec in &config.directories {
                let label = format!("{}/{} → {}", spec.owner, spec.repo, spec.dest.display());
                reports.push((label, orchestrator.sync_directory(spec)));
            }
        }

        if reports.is_empty() {
            println!("Nothing configured. Add `files` or `directories` to the config.");
            return Ok(());
        }
        if self.json {
            let json: Vec<_> = reports
                .iter()
                .map(|(label, report)| ReportJson::new(label, report))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        } else {
            for (label, report) in &reports {
                print_report(label, report);
            }
        }

        let aborted = reports
            .iter()
            .filter(|(_, r)| !r.outcome.is_usable())
            .count();
        if aborted > 0 {
            bail!("{aborted} sync(s) aborted");
        }
        Ok(())
    }
}
