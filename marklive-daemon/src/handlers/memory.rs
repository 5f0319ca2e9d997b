//! Memory handler: ephemeral markdown pushed by clients. Every push
//! carries the whole content, so there is nothing to watch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use marklive_core::{
    identity, Command, CommandError, Handler, RegistrySnapshot, ResourceId, ResourceKind,
    SharedRender, SubscriberRegistry,
};

use super::{HandlerDeps, ResourceHandler};

pub struct MemoryHandler {
    render: SharedRender,
    registries: Mutex<HashMap<ResourceId, Arc<SubscriberRegistry>>>,
    closing: CancellationToken,
    drained: CancellationToken,
}

pub fn build(deps: &HandlerDeps) -> Arc<dyn ResourceHandler> {
    Arc::new(MemoryHandler::new(deps.render.clone()))
}

impl MemoryHandler {
    pub fn new(render: SharedRender) -> Self {
        Self {
            render,
            registries: Mutex::new(HashMap::new()),
            closing: CancellationToken::new(),
            drained: CancellationToken::new(),
        }
    }

    fn registry(&self, id: &ResourceId) -> Option<Arc<SubscriberRegistry>> {
        self.registries.lock().get(id).cloned()
    }

    fn add(&self, key: &str, content: &[u8]) -> Result<(), CommandError> {
        if self.closing.is_cancelled() {
            return Err(CommandError::Closed("memory handler"));
        }
        if key.is_empty() {
            return Err(CommandError::bad_input("memory key must not be empty"));
        }
        std::str::from_utf8(content)
            .map_err(|err| CommandError::bad_input(format!("content for `{key}` is not UTF-8: {err}")))?;

        let id = identity::memory_id(key);
        let rendered = self.render.render(content);
        let registry = Arc::clone(
            self.registries
                .lock()
                .entry(id.clone())
                .or_insert_with(|| Arc::new(SubscriberRegistry::new(id.clone(), key))),
        );
        let report = registry.broadcast(rendered);
        tracing::debug!(id = %id, delivered = report.delivered, dropped = report.dropped, "memory content broadcast");
        Ok(())
    }

    fn delete(&self, id: &ResourceId) {
        if let Some(registry) = self.registries.lock().remove(id) {
            let closed = registry.close();
            tracing::info!(id = %id, connections = closed, "dropped memory resource");
        }
    }

    fn shutdown(&self) {
        self.closing.cancel();
        let registries: Vec<_> = self.registries.lock().drain().map(|(_, r)| r).collect();
        let connections: usize = registries.iter().map(|r| r.close()).sum();
        tracing::info!(resources = registries.len(), connections, "memory handler drained");
        self.drained.cancel();
    }
}

#[async_trait]
impl Handler for MemoryHandler {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn serve(&self, command: Arc<Command>) -> Result<(), CommandError> {
        match &*command {
            Command::AddMemory { key, content } => self.add(key, content),
            Command::Subscribe { id, connection } if id.is(ResourceKind::Memory) => {
                match self.registry(id) {
                    Some(registry) => registry.add(connection.clone()),
                    None => {
                        connection.close();
                        Err(CommandError::not_tracked(id))
                    }
                }
            }
            Command::Unsubscribe { id, connection } if id.is(ResourceKind::Memory) => {
                if let Some(registry) = self.registry(id) {
                    registry.remove(*connection);
                }
                Ok(())
            }
            Command::Delete { id } if id.is(ResourceKind::Memory) => {
                self.delete(id);
                Ok(())
            }
            Command::Shutdown => {
                self.shutdown();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn drained(&self) {
        self.drained.cancelled().await;
    }
}

impl ResourceHandler for MemoryHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Memory
    }

    fn lookup(&self, raw: &str) -> Option<ResourceId> {
        let id = raw.parse::<ResourceId>().unwrap_or_else(|_| identity::memory_id(raw));
        (id.is(ResourceKind::Memory) && self.registries.lock().contains_key(&id)).then_some(id)
    }

    fn preview(&self, id: &ResourceId) -> Option<(String, Option<String>)> {
        let registry = self.registry(id)?;
        Some((registry.label().to_string(), registry.last_rendered()))
    }

    fn snapshots(&self) -> Vec<RegistrySnapshot> {
        let mut snapshots: Vec<_> = self.registries.lock().values().map(|r| r.snapshot()).collect();
        snapshots.sort_by(|a, b| a.label.cmp(&b.label));
        snapshots
    }

    fn into_handler(self: Arc<Self>) -> Arc<dyn Handler> {
        self
    }
}
