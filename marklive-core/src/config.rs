//! YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.marklive/
//!   config.yaml   (optional: every key has a default)
//!   daemon.sock   (control socket, created by the daemon)
//! ```
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - callers derive the home with [`home`] and pass it down

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 1337;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 5_000;

/// Markdown extensions handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    pub tables: bool,
    pub footnotes: bool,
    pub strikethrough: bool,
    pub task_lists: bool,
    pub smart_punctuation: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            tables: true,
            footnotes: true,
            strikethrough: true,
            task_lists: true,
            smart_punctuation: false,
        }
    }
}

/// Daemon configuration, passed explicitly to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP / WebSocket port.
    pub port: u16,
    /// Change-detector tick.
    pub poll_interval_ms: u64,
    /// Ceiling the boundary waits for one dispatched command.
    pub dispatch_timeout_ms: u64,
    /// Extra directory served under `/static/`, searched first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_dir: Option<PathBuf>,
    /// Directory holding a user `page.html.tera` overriding the built-in page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
    pub markdown: MarkdownConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            dispatch_timeout_ms: DEFAULT_DISPATCH_TIMEOUT_MS,
            assets_dir: None,
            template_dir: None,
            markdown: MarkdownConfig::default(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "poll_interval_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.dispatch_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "dispatch_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.marklive/`
pub fn root_dir_at(home: &Path) -> PathBuf {
    home.join(".marklive")
}

/// `<home>/.marklive/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    root_dir_at(home).join("config.yaml")
}

/// The user's home directory, via `dirs::home_dir()`.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load `<home>/.marklive/config.yaml`, falling back to defaults when absent.
///
/// Returns `ConfigError::Parse` (with path + line context) on malformed YAML
/// and `ConfigError::Invalid` on out-of-range values.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn missing_file_yields_defaults() {
        let home = assert_fs::TempDir::new().unwrap();
        let config = load_at(home.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let home = assert_fs::TempDir::new().unwrap();
        home.child(".marklive/config.yaml")
            .write_str("port: 4000\nmarkdown:\n  tables: false\n")
            .unwrap();

        let config = load_at(home.path()).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert!(!config.markdown.tables);
        assert!(config.markdown.footnotes);
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let home = assert_fs::TempDir::new().unwrap();
        home.child(".marklive/config.yaml")
            .write_str("port: [unclosed")
            .unwrap();

        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let home = assert_fs::TempDir::new().unwrap();
        home.child(".marklive/config.yaml")
            .write_str("poll_interval_ms: 0\n")
            .unwrap();

        let err = load_at(home.path()).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { key: "poll_interval_ms", .. }),
            "got: {err}"
        );
    }
}
