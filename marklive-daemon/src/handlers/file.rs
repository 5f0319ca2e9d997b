//! File handler: durable markdown files, polled for changes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use marklive_core::{
    identity, Command, CommandError, ConnectionId, Handler, RegistrySnapshot, ResourceId,
    ResourceKind, SharedConnection, SharedRender, SubscriberRegistry,
};
use marklive_detector::{DetectError, Snapshot, WatchMonitor};

use super::{HandlerDeps, ResourceHandler};

pub struct FileHandler {
    render: SharedRender,
    registries: Mutex<HashMap<ResourceId, Arc<SubscriberRegistry>>>,
    monitor: WatchMonitor,
    closing: CancellationToken,
    drained: CancellationToken,
}

pub fn build(deps: &HandlerDeps) -> Arc<dyn ResourceHandler> {
    Arc::new(FileHandler::new(deps))
}

impl FileHandler {
    pub fn new(deps: &HandlerDeps) -> Self {
        Self {
            render: deps.render.clone(),
            registries: Mutex::new(HashMap::new()),
            monitor: WatchMonitor::new(deps.render.clone(), deps.poll_interval, deps.changes.clone()),
            closing: CancellationToken::new(),
            drained: CancellationToken::new(),
        }
    }

    fn registry(&self, id: &ResourceId) -> Option<Arc<SubscriberRegistry>> {
        self.registries.lock().get(id).cloned()
    }

    async fn add(&self, path: &Path) -> Result<(), CommandError> {
        if self.closing.is_cancelled() {
            return Err(CommandError::Closed("file handler"));
        }
        let (canonical, id) = identity::resolve_file(path)
            .map_err(|err| CommandError::bad_input(format!("{}: {err}", path.display())))?;
        if self.registries.lock().contains_key(&id) {
            tracing::debug!(id = %id, "file already tracked");
            return Ok(());
        }

        // Baseline first: an edit landing during the read is caught by the
        // watcher's first tick instead of being folded into the baseline.
        let baseline = Snapshot::capture(&canonical)
            .await
            .map_err(|err| CommandError::bad_input(err.to_string()))?;
        let source = tokio::fs::read(&canonical)
            .await
            .map_err(|err| CommandError::bad_input(format!("{}: {err}", canonical.display())))?;
        let rendered = self.render.render(&source);

        let mut registries = self.registries.lock();
        if registries.contains_key(&id) {
            return Ok(());
        }
        self.monitor
            .add_with(id.clone(), canonical.clone(), baseline)
            .map_err(|err| match err {
                DetectError::Stat { .. } => CommandError::bad_input(err.to_string()),
                DetectError::ShutDown => CommandError::Closed("file handler"),
            })?;
        let label = canonical.display().to_string();
        registries.insert(
            id.clone(),
            Arc::new(SubscriberRegistry::with_content(id.clone(), label, rendered)),
        );
        tracing::info!(id = %id, path = %canonical.display(), "tracking file");
        Ok(())
    }

    fn subscribe(&self, id: &ResourceId, connection: SharedConnection) -> Result<(), CommandError> {
        match self.registry(id) {
            Some(registry) => registry.add(connection),
            None => {
                connection.close();
                Err(CommandError::not_tracked(id))
            }
        }
    }

    fn unsubscribe(&self, id: &ResourceId, connection: ConnectionId) {
        if let Some(registry) = self.registry(id) {
            registry.remove(connection);
        }
    }

    fn changed(&self, id: &ResourceId, rendered: &str) {
        match self.registry(id) {
            Some(registry) => {
                let report = registry.broadcast(rendered.to_string());
                tracing::debug!(id = %id, delivered = report.delivered, dropped = report.dropped, "file change broadcast");
            }
            // A watcher can race a delete by one tick.
            None => tracing::debug!(id = %id, "change for untracked file ignored"),
        }
    }

    fn delete(&self, id: &ResourceId) {
        let removed = self.registries.lock().remove(id);
        self.monitor.remove(id);
        if let Some(registry) = removed {
            let closed = registry.close();
            tracing::info!(id = %id, connections = closed, "stopped tracking file");
        }
    }

    async fn shutdown(&self) {
        self.closing.cancel();
        let registries: Vec<_> = self.registries.lock().drain().map(|(_, r)| r).collect();
        let connections: usize = registries.iter().map(|r| r.close()).sum();
        self.monitor.shutdown().await;
        tracing::info!(resources = registries.len(), connections, "file handler drained");
        self.drained.cancel();
    }
}

#[async_trait]
impl Handler for FileHandler {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn serve(&self, command: Arc<Command>) -> Result<(), CommandError> {
        match &*command {
            Command::AddFile { path } => self.add(path).await,
            Command::Subscribe { id, connection } if id.is(ResourceKind::File) => {
                self.subscribe(id, connection.clone())
            }
            Command::Unsubscribe { id, connection } if id.is(ResourceKind::File) => {
                self.unsubscribe(id, *connection);
                Ok(())
            }
            Command::Changed { id, rendered } if id.is(ResourceKind::File) => {
                self.changed(id, rendered);
                Ok(())
            }
            Command::Delete { id } if id.is(ResourceKind::File) => {
                self.delete(id);
                Ok(())
            }
            Command::Shutdown => {
                self.shutdown().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn drained(&self) {
        self.drained.cancelled().await;
    }
}

impl ResourceHandler for FileHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::File
    }

    fn lookup(&self, raw: &str) -> Option<ResourceId> {
        let id = match raw.parse::<ResourceId>() {
            Ok(id) => id,
            Err(_) => identity::resolve_file(Path::new(raw)).ok()?.1,
        };
        (id.is(ResourceKind::File) && self.registries.lock().contains_key(&id)).then_some(id)
    }

    fn preview(&self, id: &ResourceId) -> Option<(String, Option<String>)> {
        let registry = self.registry(id)?;
        let title = Path::new(registry.label())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| registry.label().to_string());
        Some((title, registry.last_rendered()))
    }

    fn snapshots(&self) -> Vec<RegistrySnapshot> {
        let mut snapshots: Vec<_> = self.registries.lock().values().map(|r| r.snapshot()).collect();
        snapshots.sort_by(|a, b| a.label.cmp(&b.label));
        snapshots
    }

    fn watchers(&self) -> usize {
        self.monitor.len()
    }

    fn into_handler(self: Arc<Self>) -> Arc<dyn Handler> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marklive_core::{ChannelConnection, Outbound, RenderFrame};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn handler() -> (FileHandler, mpsc::Receiver<Command>) {
        let (changes, rx) = mpsc::channel(8);
        let deps = HandlerDeps {
            render: Arc::new(|source: &[u8]| format!("<{}>", String::from_utf8_lossy(source))),
            poll_interval: Duration::from_millis(20),
            changes,
        };
        (FileHandler::new(&deps), rx)
    }

    #[tokio::test]
    async fn memory_ids_are_ignored() {
        let (handler, _rx) = handler();
        let cmd = Command::Subscribe {
            id: identity::memory_id("x"),
            connection: Arc::new(ChannelConnection::new().0),
        };
        assert_eq!(handler.serve(Arc::new(cmd)).await, Ok(()));
    }

    #[tokio::test]
    async fn missing_file_is_bad_input() {
        let (handler, _rx) = handler();
        let dir = TempDir::new().unwrap();
        let cmd = Command::AddFile {
            path: dir.path().join("missing.md"),
        };
        let err = handler.serve(Arc::new(cmd)).await.unwrap_err();
        assert!(matches!(err, CommandError::BadInput(_)), "got: {err}");
        assert_eq!(handler.watchers(), 0);
    }

    #[tokio::test]
    async fn add_seeds_registry_and_lookup_by_path() {
        let (handler, _rx) = handler();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        std::fs::write(&path, "# Hi").unwrap();

        handler
            .serve(Arc::new(Command::AddFile { path: path.clone() }))
            .await
            .unwrap();
        let id = handler.lookup(path.to_str().unwrap()).expect("tracked");

        let (conn, mut rx) = ChannelConnection::new();
        handler.subscribe(&id, Arc::new(conn)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame(RenderFrame::new("<# Hi>")));

        let (title, _) = handler.preview(&id).unwrap();
        assert_eq!(title, "a.md");
        handler.shutdown().await;
    }

    #[tokio::test]
    async fn add_after_shutdown_is_refused() {
        let (handler, _rx) = handler();
        handler.shutdown().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        std::fs::write(&path, "# Hi").unwrap();

        let err = handler.add(&path).await.unwrap_err();
        assert_eq!(err, CommandError::Closed("file handler"));
    }
}
