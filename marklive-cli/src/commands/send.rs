//! `marklive send` — publish markdown held in memory under a key.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Args;

use marklive_daemon::{request_send, DaemonError};

/// Arguments for `marklive send`.
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Memory key; the same key always maps to the same preview.
    pub key: String,

    /// Markdown text, or `-` to read it from stdin.
    pub data: String,
}

impl SendArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let data = if self.data == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read markdown from stdin")?;
            buf
        } else {
            self.data
        };

        match request_send(&home, &self.key, data) {
            Ok(id) => {
                println!("{id}");
                Ok(())
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                anyhow::bail!("daemon is not running; start one with `marklive start <path>`")
            }
            Err(err) => Err(err).with_context(|| format!("failed to send '{}'", self.key)),
        }
    }
}
