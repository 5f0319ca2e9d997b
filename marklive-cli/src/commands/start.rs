//! `marklive start` — track a file, launching the daemon when none is running.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use marklive_core::{config, identity};
use marklive_daemon::paths::HTTP_HOST;
use marklive_daemon::{request_add, request_status, start_blocking, DaemonError, StartOptions};

/// Arguments for `marklive start`.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Markdown file to preview.
    pub path: PathBuf,

    /// HTTP port for a newly started daemon (ignored when one is running).
    #[arg(long)]
    pub port: Option<u16>,

    /// Open the preview in a browser.
    #[arg(long)]
    pub open: bool,

    /// Browser command used with `--open` instead of the platform default.
    #[arg(long, requires = "open")]
    pub browser: Option<String>,
}

impl StartArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let (canonical, id) = identity::resolve_file(&self.path)
            .with_context(|| format!("cannot read {}", self.path.display()))?;

        match request_add(&home, &canonical) {
            Ok(tracked) => {
                println!("{} {}", "tracking".green(), tracked.url);
                if self.open {
                    open_browser(self.browser.as_deref(), &tracked.url)?;
                }
                Ok(())
            }
            Err(DaemonError::Rejected { message, .. }) => {
                anyhow::bail!("daemon rejected {}: {message}", canonical.display())
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let config = config::load_at(&home).context("failed to load config")?;
                let port = self.port.unwrap_or(config.port);
                let url = format!("http://{HTTP_HOST}:{port}/?id={id}");
                println!("{} {}", "serving".green(), url);

                if self.open {
                    let home = home.clone();
                    let browser = self.browser.clone();
                    thread::spawn(move || open_when_ready(&home, browser.as_deref(), &url));
                }

                let options = StartOptions {
                    port: self.port,
                    files: vec![canonical],
                };
                start_blocking(&home, options).context("daemon exited with error")
            }
            Err(err) => Err(err).context("failed to reach daemon"),
        }
    }
}

fn open_when_ready(home: &Path, browser: Option<&str>, url: &str) {
    if let Err(err) = request_status(home) {
        eprintln!("{} daemon did not come up: {err}", "warning:".yellow());
        return;
    }
    if let Err(err) = open_browser(browser, url) {
        eprintln!("{} {err:#}", "warning:".yellow());
    }
}

fn open_browser(browser: Option<&str>, url: &str) -> Result<()> {
    let program = browser.unwrap_or(if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    });
    Command::new(program)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to launch browser `{program}`"))?;
    Ok(())
}
