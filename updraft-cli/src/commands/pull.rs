//! `updraft pull <owner/repo> --dest <dir>`: ad hoc directory sync.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use updraft_core::{DirectorySpec, RepoId};
use updraft_sync::BatchOrchestrator;

use super::{client_for, load_config, print_report, probe_for, ReportJson};

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Repository as `owner/repo`.
    pub repo: RepoId,

    /// Local directory to publish into.
    #[arg(long)]
    pub dest: PathBuf,

    /// Branch, tag or commit (default branch when omitted).
    #[arg(long = "ref")]
    pub reference: Option<String>,

    /// Only this directory of the repository.
    #[arg(long)]
    pub subpath: Option<String>,

    #[arg(long)]
    pub json: bool,
}

impl PullArgs {
    pub fn run(self) -> Result<()> {
        let (home, config) = load_config()?;
        let spec = DirectorySpec {
            owner: self.repo.owner.clone(),
            repo: self.repo.repo.clone(),
            reference: self.reference,
            subpath: self.subpath,
            dest: self.dest,
        };
        let client = client_for(&config);
        let probe = probe_for(&config);
        let report = BatchOrchestrator::new(&client, &probe, &config, &home).sync_directory(&spec);

        let label = self.repo.to_string();
        if self.json {
            println!("{}", serde_json::to_string_pretty(&ReportJson::new(&label, &report))?);
        } else {
            print_report(&label, &report);
        }
        if !report.outcome.is_usable() {
            bail!("pull of {label} aborted");
        }
        Ok(())
    }
}
