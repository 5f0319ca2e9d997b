//! WatchMonitor: the set of watchers owned by one resource handler.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use marklive_core::{Command, ResourceId, SharedRender};

use crate::snapshot::Snapshot;
use crate::watcher::Watcher;
use crate::DetectError;

pub struct WatchMonitor {
    render: SharedRender,
    interval: Duration,
    changes: mpsc::Sender<Command>,
    root: CancellationToken,
    watchers: Mutex<HashMap<ResourceId, Watcher>>,
}

impl WatchMonitor {
    pub fn new(render: SharedRender, interval: Duration, changes: mpsc::Sender<Command>) -> Self {
        Self {
            render,
            interval,
            changes,
            root: CancellationToken::new(),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot `path` now and start watching it under `id`. Returns
    /// `Ok(false)` when `id` is already watched.
    pub async fn add(&self, id: ResourceId, path: PathBuf) -> Result<bool, DetectError> {
        let baseline = Snapshot::capture(&path).await?;
        self.add_with(id, path, baseline)
    }

    /// Start watching `path` under `id` against a `baseline` the caller took
    /// before reading the content it already published. A write landing
    /// after the baseline is reported on the first tick.
    pub fn add_with(
        &self,
        id: ResourceId,
        path: PathBuf,
        baseline: Snapshot,
    ) -> Result<bool, DetectError> {
        if self.root.is_cancelled() {
            return Err(DetectError::ShutDown);
        }
        let mut watchers = self.watchers.lock();
        if watchers.contains_key(&id) {
            return Ok(false);
        }
        let watcher = Watcher::start(
            id.clone(),
            path,
            baseline,
            self.render.clone(),
            self.interval,
            self.changes.clone(),
            self.root.child_token(),
        );
        watchers.insert(id, watcher);
        Ok(true)
    }

    /// Stop and forget the watcher for `id`. Does not wait for the task.
    pub fn remove(&self, id: &ResourceId) -> bool {
        match self.watchers.lock().remove(id) {
            Some(watcher) => {
                watcher.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every watcher and wait for every polling task to exit. Later
    /// `add` calls fail with [`DetectError::ShutDown`].
    pub async fn shutdown(&self) {
        self.root.cancel();
        let drained: Vec<Watcher> = self.watchers.lock().drain().map(|(_, w)| w).collect();
        let count = drained.len();
        for watcher in drained {
            watcher.join().await;
        }
        tracing::debug!(watchers = count, "watch monitor shut down");
    }

    pub fn len(&self) -> usize {
        self.watchers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.watchers.lock().contains_key(id)
    }
}
