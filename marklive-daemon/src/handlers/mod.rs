//! Concrete dispatch handlers.
//!
//! Resource handlers (one per [`ResourceKind`]) own the subscriber
//! registries of their kind and are built from [`RESOURCE_HANDLERS`], a
//! constructor table the coordinator walks in order. Auxiliary handlers such
//! as [`AssetPaths`] are registered next to them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use marklive_core::{Command, Handler, RegistrySnapshot, ResourceId, ResourceKind, SharedRender};

pub mod assets;
pub mod file;
pub mod memory;

pub use assets::AssetPaths;
pub use file::FileHandler;
pub use memory::MemoryHandler;

/// What every resource handler constructor receives.
#[derive(Clone)]
pub struct HandlerDeps {
    pub render: SharedRender,
    pub poll_interval: Duration,
    /// Where watchers report `Command::Changed`.
    pub changes: mpsc::Sender<Command>,
}

/// A handler owning the resources of one kind.
pub trait ResourceHandler: Handler {
    fn kind(&self) -> ResourceKind;

    /// The id of a tracked resource named by `raw`: either an id string or
    /// the resource's natural key (path, memory key). `None` when this
    /// handler does not track it.
    fn lookup(&self, raw: &str) -> Option<ResourceId>;

    /// Label and last render of a tracked resource.
    fn preview(&self, id: &ResourceId) -> Option<(String, Option<String>)>;

    fn snapshots(&self) -> Vec<RegistrySnapshot>;

    /// Number of running change detectors.
    fn watchers(&self) -> usize {
        0
    }

    /// Erase to the dispatcher-facing trait.
    fn into_handler(self: Arc<Self>) -> Arc<dyn Handler>;
}

pub type ResourceHandlerCtor = fn(&HandlerDeps) -> Arc<dyn ResourceHandler>;

/// Resource handlers in registration order. `get_id` asks them in this order.
pub const RESOURCE_HANDLERS: &[(ResourceKind, ResourceHandlerCtor)] = &[
    (ResourceKind::File, file::build),
    (ResourceKind::Memory, memory::build),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_exactly_one_constructor() {
        for kind in ResourceKind::all() {
            let count = RESOURCE_HANDLERS.iter().filter(|(k, _)| k == kind).count();
            assert_eq!(count, 1, "{kind}");
        }
    }

    #[tokio::test]
    async fn constructors_build_handlers_of_their_kind() {
        let (changes, _rx) = mpsc::channel(1);
        let deps = HandlerDeps {
            render: Arc::new(|source: &[u8]| String::from_utf8_lossy(source).into_owned()),
            poll_interval: Duration::from_millis(50),
            changes,
        };
        for (kind, ctor) in RESOURCE_HANDLERS {
            assert_eq!(ctor(&deps).kind(), *kind);
        }
    }
}
