//! Error types for marklive-core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::command::CommandKind;

/// Outcome of a dispatched command that did not succeed.
///
/// Delivery failures to a single connection are not part of this taxonomy:
/// they are recovered inside the registry by dropping that connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Malformed add/subscribe request (missing path, unreadable file,
    /// non-UTF-8 content). Reported to the caller, never retried.
    #[error("bad input: {0}")]
    BadInput(String),

    /// The command referenced a resource id nobody tracks.
    #[error("resource not tracked: {id}")]
    NotTracked { id: String },

    /// The fan-out did not complete before the boundary deadline. Handlers
    /// keep running in the background.
    #[error("{command} did not complete within {}ms", .after.as_millis())]
    Timeout {
        command: CommandKind,
        after: Duration,
    },

    /// A channel between the boundary and the dispatcher went away.
    #[error("channel closed: {0}")]
    Closed(&'static str),
}

impl CommandError {
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput(message.into())
    }

    pub fn not_tracked(id: impl ToString) -> Self {
        Self::NotTracked { id: id.to_string() }
    }

    /// Short machine-readable code used by the control protocol.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::BadInput(_) => "bad_input",
            CommandError::NotTracked { .. } => "not_tracked",
            CommandError::Timeout { .. } => "timeout",
            CommandError::Closed(_) => "closed",
        }
    }
}

/// Errors that can arise while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure reading the config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error: includes the file path and serde_yaml's line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for `{key}`: {message}")]
    Invalid { key: &'static str, message: String },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
