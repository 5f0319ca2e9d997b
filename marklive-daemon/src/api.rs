//! The transport-agnostic command boundary.
//!
//! Every surface (control socket, HTTP, WebSocket sessions, tests) talks to
//! the handlers through [`Api`]: it builds the typed [`Command`], dispatches
//! it and waits with the configured ceiling.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use marklive_core::{
    identity, Command, CommandError, ConnectionId, Dispatcher, Handler, RegistrySnapshot,
    ResourceId, SharedConnection,
};

use crate::handlers::ResourceHandler;

/// Status payload served by `status` requests.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub started_at: DateTime<Utc>,
    pub watchers: usize,
    pub stopping: bool,
    pub resources: Vec<RegistrySnapshot>,
}

pub(crate) struct Inner {
    pub(crate) dispatcher: Dispatcher,
    /// Resource handlers in registration order.
    pub(crate) resources: Vec<Arc<dyn ResourceHandler>>,
    /// Every registered handler, for the drain barrier.
    pub(crate) handlers: Vec<Arc<dyn Handler>>,
    pub(crate) timeout: Duration,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) stopping: AtomicBool,
    pub(crate) stopped: CancellationToken,
}

/// Cheap to clone; all clones share one dispatcher.
#[derive(Clone)]
pub struct Api {
    inner: Arc<Inner>,
}

impl Api {
    pub(crate) fn new(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    async fn run(&self, command: Command) -> Result<(), CommandError> {
        if self.inner.stopping.load(Ordering::SeqCst) {
            return Err(CommandError::Closed("dispatcher"));
        }
        self.inner.dispatcher.dispatch(command).wait(self.inner.timeout).await
    }

    /// Track a markdown file. Returns its id.
    pub async fn add_file(&self, path: &Path) -> Result<ResourceId, CommandError> {
        let (canonical, id) = identity::resolve_file(path)
            .map_err(|err| CommandError::bad_input(format!("{}: {err}", path.display())))?;
        self.run(Command::AddFile { path: canonical }).await?;
        Ok(id)
    }

    /// Track or update an in-memory resource. Returns its id.
    pub async fn add_memory(&self, key: &str, content: Vec<u8>) -> Result<ResourceId, CommandError> {
        let id = identity::memory_id(key);
        self.run(Command::AddMemory {
            key: key.to_string(),
            content,
        })
        .await?;
        Ok(id)
    }

    /// Stop tracking `id`. Unknown ids are not an error.
    pub async fn remove(&self, id: ResourceId) -> Result<(), CommandError> {
        self.run(Command::Delete { id }).await
    }

    /// Attach `connection`; it immediately receives the current render.
    pub async fn subscribe(&self, id: ResourceId, connection: SharedConnection) -> Result<(), CommandError> {
        self.run(Command::Subscribe { id, connection }).await
    }

    pub async fn unsubscribe(&self, id: ResourceId, connection: ConnectionId) -> Result<(), CommandError> {
        self.run(Command::Unsubscribe { id, connection }).await
    }

    /// Forward a detector change. Waits without a ceiling so changes of one
    /// resource reach its registry in detection order.
    pub(crate) async fn forward_change(&self, command: Command) {
        if self.inner.stopping.load(Ordering::SeqCst) {
            return;
        }
        for err in self.inner.dispatcher.dispatch(command).completed().await {
            tracing::debug!(error = %err, "change dispatch reported error");
        }
    }

    /// Ask every resource kind in registration order; first hit wins.
    pub fn get_id(&self, raw: &str) -> Option<ResourceId> {
        self.inner.resources.iter().find_map(|handler| handler.lookup(raw))
    }

    /// Page title and last render of a tracked resource.
    pub fn preview(&self, id: &ResourceId) -> Option<(String, Option<String>)> {
        self.inner
            .resources
            .iter()
            .filter(|handler| id.is(handler.kind()))
            .find_map(|handler| handler.preview(id))
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            started_at: self.inner.started_at,
            watchers: self.inner.resources.iter().map(|h| h.watchers()).sum(),
            stopping: self.inner.stopping.load(Ordering::SeqCst),
            resources: self
                .inner
                .resources
                .iter()
                .flat_map(|h| h.snapshots())
                .collect(),
        }
    }

    /// The shutdown barrier: dispatch `Shutdown`, wait for the fan-out, then
    /// wait for every handler to report drained before releasing
    /// [`Api::stopped`]. Concurrent callers all return once the barrier is
    /// released.
    pub async fn shutdown(&self) {
        if self.inner.stopping.swap(true, Ordering::SeqCst) {
            self.inner.stopped.cancelled().await;
            return;
        }
        tracing::info!("shutting down handlers");

        for err in self.inner.dispatcher.dispatch(Command::Shutdown).completed().await {
            tracing::warn!(error = %err, "handler failed during shutdown");
        }
        futures::future::join_all(self.inner.handlers.iter().map(|h| h.drained())).await;

        tracing::info!(handlers = self.inner.handlers.len(), "all handlers drained");
        self.inner.stopped.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::SeqCst)
    }

    /// Resolves once the shutdown barrier completed.
    pub async fn stopped(&self) {
        self.inner.stopped.cancelled().await;
    }
}
