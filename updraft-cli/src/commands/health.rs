//! `updraft health`: connectivity and API budget.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use updraft_remote::{check_health, Connectivity};

use super::{client_for, load_config, probe_for};

#[derive(Args, Debug)]
pub struct HealthArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct HealthJson {
    online: bool,
    limit: Option<u64>,
    remaining: Option<u64>,
    reset_at: Option<String>,
    error: Option<String>,
}

impl HealthArgs {
    pub fn run(self) -> Result<()> {
        let (_, config) = load_config()?;
        let probe = probe_for(&config);
        let client = client_for(&config);

        let mut out = HealthJson {
            online: false,
            limit: None,
            remaining: None,
            reset_at: None,
            error: None,
        };
        match probe.check() {
            Ok(()) => {
                out.online = true;
                match check_health(&client) {
                    Ok(h) => {
                        out.limit = Some(h.limit);
                        out.remaining = Some(h.remaining);
                        out.reset_at = h.reset_at.map(|t| t.to_rfc3339());
                    }
                    Err(e) => out.error = Some(e.to_string()),
                }
            }
            Err(e) => out.error = Some(e.to_string()),
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(());
        }
        if out.online {
            println!("{} network reachable", "✓".green());
        } else {
            println!("{} network unreachable", "✗".red());
        }
        if let (Some(remaining), Some(limit)) = (out.remaining, out.limit) {
            let line = format!("API budget: {remaining}/{limit} remaining");
            if remaining == 0 {
                println!("{} {line}", "✗".red());
            } else {
                println!("{} {line}", "✓".green());
            }
            if let Some(reset) = &out.reset_at {
                println!("  resets at {reset}");
            }
        }
        if let Some(err) = &out.error {
            println!("  {}", err.dimmed());
        }
        Ok(())
    }
}
