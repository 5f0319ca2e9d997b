//! `marklive status` — what the daemon tracks and who is watching.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use tabled::{settings::Style, Table, Tabled};

use marklive_core::ResourceKind;
use marklive_daemon::paths::socket_path;
use marklive_daemon::{request_status, DaemonError};

/// Arguments for `marklive status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;

        let payload = match request_status(&home) {
            Ok(payload) => payload,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                if self.json {
                    let payload = serde_json::json!({
                        "running": false,
                        "socket": socket_path(&home).display().to_string(),
                    });
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&payload)
                            .context("failed to render status JSON")?
                    );
                } else {
                    println!("{}", "daemon is not running".yellow());
                }
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
            );
            return Ok(());
        }

        let status: DaemonStatus =
            serde_json::from_value(payload).context("unexpected daemon status payload")?;
        print_table(status, Utc::now());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DaemonStatus {
    started_at: DateTime<Utc>,
    watchers: usize,
    stopping: bool,
    port: u16,
    pid: u32,
    resources: Vec<ResourceStatus>,
}

#[derive(Debug, Deserialize)]
struct ResourceStatus {
    id: String,
    kind: ResourceKind,
    label: String,
    subscribers: usize,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "source")]
    label: String,
    #[tabled(rename = "subscribers")]
    subscribers: usize,
    #[tabled(rename = "updated")]
    updated: String,
    #[tabled(rename = "id")]
    id: String,
}

fn print_table(status: DaemonStatus, now: DateTime<Utc>) {
    let state = if status.stopping {
        "stopping".yellow()
    } else {
        "running".green()
    };
    println!(
        "daemon {} (pid {}, port {}, up {})",
        state,
        status.pid,
        status.port,
        format_age(status.started_at, now)
    );
    println!(
        "{} resources, {} file watchers",
        status.resources.len(),
        status.watchers
    );

    if status.resources.is_empty() {
        return;
    }

    let rows: Vec<StatusTableRow> = status
        .resources
        .into_iter()
        .map(|resource| StatusTableRow {
            kind: match resource.kind {
                ResourceKind::File => "file".cyan().to_string(),
                ResourceKind::Memory => "memory".magenta().to_string(),
            },
            label: resource.label,
            subscribers: resource.subscribers,
            updated: resource
                .updated_at
                .map(|at| format!("{} ago", format_age(at, now)))
                .unwrap_or_else(|| "never".to_string()),
            id: short_id(&resource.id),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3_599 => format!("{}m", secs / 60),
        3_600..=86_399 => format!("{}h", secs / 3_600),
        _ => format!("{}d", secs / 86_400),
    }
}

/// `f-0123456789ab…` keeps the table narrow; `marklive id` prints the full id.
fn short_id(id: &str) -> String {
    match id.char_indices().nth(14) {
        Some((cut, _)) => format!("{}…", &id[..cut]),
        None => id.to_string(),
    }
}
