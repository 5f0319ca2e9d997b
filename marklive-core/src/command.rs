//! Typed commands carried by the dispatcher.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::connection::SharedConnection;
use crate::types::{ConnectionId, ResourceId};

/// Coarse classification of a [`Command`], used for logging and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    ResourceAdd,
    ResourceDelete,
    ResourceChanged,
    ClientSubscribe,
    ClientUnsubscribe,
    Shutdown,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::ResourceAdd => "RESOURCE_ADD",
            CommandKind::ResourceDelete => "RESOURCE_DELETE",
            CommandKind::ResourceChanged => "RESOURCE_CHANGED",
            CommandKind::ClientSubscribe => "CLIENT_SUBSCRIBE",
            CommandKind::ClientUnsubscribe => "CLIENT_UNSUBSCRIBE",
            CommandKind::Shutdown => "SHUTDOWN",
        };
        f.write_str(name)
    }
}

/// A command fanned out to every registered handler.
///
/// Each variant carries exactly the payload its handlers need; handlers
/// ignore variants (or ids) that belong to another resource kind.
#[derive(Debug, Clone)]
pub enum Command {
    /// Track a markdown file on disk.
    AddFile { path: PathBuf },
    /// Track (or update) an in-memory markdown blob under `key`.
    AddMemory { key: String, content: Vec<u8> },
    /// Stop tracking a resource and close its subscribers.
    Delete { id: ResourceId },
    /// A watcher noticed new content for `id`.
    Changed { id: ResourceId, rendered: String },
    /// Attach a live connection to a tracked resource.
    Subscribe {
        id: ResourceId,
        connection: SharedConnection,
    },
    /// Detach a connection whose transport went away.
    Unsubscribe {
        id: ResourceId,
        connection: ConnectionId,
    },
    /// Close everything and drain.
    Shutdown,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::AddFile { .. } | Command::AddMemory { .. } => CommandKind::ResourceAdd,
            Command::Delete { .. } => CommandKind::ResourceDelete,
            Command::Changed { .. } => CommandKind::ResourceChanged,
            Command::Subscribe { .. } => CommandKind::ClientSubscribe,
            Command::Unsubscribe { .. } => CommandKind::ClientUnsubscribe,
            Command::Shutdown => CommandKind::Shutdown,
        }
    }

    /// The resource a command targets, when it names one by id.
    pub fn resource_id(&self) -> Option<&ResourceId> {
        match self {
            Command::Delete { id }
            | Command::Changed { id, .. }
            | Command::Subscribe { id, .. }
            | Command::Unsubscribe { id, .. } => Some(id),
            Command::AddFile { .. } | Command::AddMemory { .. } | Command::Shutdown => None,
        }
    }
}
