//! Change detection for `marklive-detector`.
//!
//! A [`Watcher`] polls one durable resource (a file on disk) and reports a
//! `Command::Changed` carrying the freshly rendered content whenever its size
//! or modification time moves. A [`WatchMonitor`] owns every watcher of a
//! handler, keyed by [`marklive_core::ResourceId`].
//!
//! ```text
//! Idle --start--> Polling --size/mtime differ--> Changed --send--> Polling
//!                    |                                              |
//!                    +----------- cancel (delete / shutdown) -------+--> Stopped
//! ```
//!
//! Watchers never call the dispatcher: they only push into the change
//! channel handed to them, which the coordinator drains.

use std::path::PathBuf;

use thiserror::Error;

pub mod monitor;
pub mod snapshot;
pub mod watcher;

pub use monitor::WatchMonitor;
pub use snapshot::Snapshot;
pub use watcher::Watcher;

/// Errors from starting change detection.
#[derive(Debug, Error)]
pub enum DetectError {
    /// The initial stat failed; the resource cannot be watched.
    #[error("cannot stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The monitor was shut down and accepts no new watchers.
    #[error("watch monitor is shut down")]
    ShutDown,
}
