//! `updraft init <root>`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use updraft_core::config;

/// Write a default config rooted at a local directory.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Local sync root; files land under <root>/<owner>/<repo>/…
    pub root: PathBuf,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("cannot create '{}'", self.root.display()))?;
        let root = self
            .root
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.root.display()))?;

        let cfg = config::init_at(&home, root)
            .with_context(|| format!("failed to init config under '{}'", home.display()))?;

        println!("✓ Sync root: {}", cfg.root.display());
        println!("  Config: {}", config::config_path_at(&home).display());
        Ok(())
    }
}
