//! `marklive stop` — untrack one resource or shut the daemon down.

use anyhow::{Context, Result};
use clap::Args;

use marklive_daemon::{request_remove, request_stop, DaemonError};

/// Arguments for `marklive stop`.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Path, memory key or id to untrack. Without it the daemon stops.
    pub target: Option<String>,
}

impl StopArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;

        let outcome = match self.target.as_deref() {
            Some(target) => {
                request_remove(&home, &super::resolve_target(target)).map(|removed| {
                    if removed {
                        format!("removed {target}")
                    } else {
                        format!("{target} is not tracked")
                    }
                })
            }
            None => request_stop(&home).map(|()| "daemon stopped".to_string()),
        };

        match outcome {
            Ok(message) => println!("{message}"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
            Err(err) => return Err(err).context("failed to stop"),
        }
        Ok(())
    }
}
