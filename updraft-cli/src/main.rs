//! updraft: integrity-checked self-update from a remote repository.
//!
//! # Usage
//!
//! ```text
//! updraft init <root>
//! updraft sync [--files-only | --dirs-only] [--json]
//! updraft pull <owner/repo> --dest <dir> [--ref <ref>] [--subpath <path>] [--json]
//! updraft verify <owner/repo> --dest <dir>
//! updraft health [--json]
//! ```
//!
//! Logging goes to stderr; set `RUST_LOG=debug` for state transitions.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    health::HealthArgs, init::InitArgs, pull::PullArgs, sync::SyncArgs, verify::VerifyArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "updraft",
    version,
    about = "Keep local files in step with a remote repository, atomically",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default ~/.updraft/config.yaml.
    Init(InitArgs),

    /// Update every file and directory listed in the config.
    Sync(SyncArgs),

    /// Mirror one remote directory into a local destination.
    Pull(PullArgs),

    /// Check a pulled directory against its last published manifest.
    Verify(VerifyArgs),

    /// Report connectivity and remaining API budget.
    Health(HealthArgs),
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Pull(args) => args.run(),
        Commands::Verify(args) => args.run(),
        Commands::Health(args) => args.run(),
    }
}
