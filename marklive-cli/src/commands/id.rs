//! `marklive id` — resolve a path, key or id to the id the daemon tracks.

use anyhow::{Context, Result};
use clap::Args;

use marklive_daemon::{request_get_id, DaemonError};

/// Arguments for `marklive id`.
#[derive(Args, Debug)]
pub struct IdArgs {
    /// File path, memory key or resource id.
    pub target: String,
}

impl IdArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        match request_get_id(&home, &super::resolve_target(&self.target)) {
            Ok(id) => {
                println!("{id}");
                Ok(())
            }
            Err(DaemonError::Rejected { code, .. }) if code == "not_found" => {
                anyhow::bail!("'{}' is not tracked", self.target)
            }
            Err(DaemonError::DaemonNotRunning { .. }) => anyhow::bail!("daemon is not running"),
            Err(err) => Err(err).context("failed to resolve id"),
        }
    }
}
