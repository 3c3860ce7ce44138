//! `updraft verify <owner/repo> --dest <dir>`: offline integrity check.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use updraft_core::{DirectorySpec, RepoId};
use updraft_sync::{manifest, verify};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Repository the directory was pulled from, as `owner/repo`.
    pub repo: RepoId,

    /// Directory to check.
    #[arg(long)]
    pub dest: PathBuf,
}

impl VerifyArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let spec = DirectorySpec {
            owner: self.repo.owner.clone(),
            repo: self.repo.repo.clone(),
            reference: None,
            subpath: None,
            dest: self.dest.clone(),
        };
        let key = manifest::manifest_key(&spec);
        let Some(stored) = manifest::load_at(&home, &key)? else {
            bail!(
                "no manifest for {} at {}; pull it first",
                self.repo,
                self.dest.display()
            );
        };

        let listing = stored.to_listing()?;
        if verify(&listing, &self.dest) {
            println!(
                "{} {} matches {} ({} file(s), synced {})",
                "✓".green(),
                self.dest.display(),
                stored.commit,
                stored.files.len(),
                stored.synced_at.format("%Y-%m-%d %H:%M UTC")
            );
            Ok(())
        } else {
            println!("{} {} does not match {}", "✗".red(), self.dest.display(), stored.commit);
            bail!("integrity check failed")
        }
    }
}
