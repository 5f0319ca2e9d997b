use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use marklive_core::{CommandError, ConfigError};
use marklive_renderer::RenderError;

/// Error surface for the daemon runtime, its servers and the socket client.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    /// The daemon answered with `ok: false`.
    #[error("{message} ({code})")]
    Rejected { code: String, message: String },

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
