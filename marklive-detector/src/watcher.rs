//! One polling task per watched file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use marklive_core::{Command, ResourceId, SharedRender};

use crate::snapshot::Snapshot;

/// Handle on a running polling task.
#[derive(Debug)]
pub struct Watcher {
    id: ResourceId,
    path: PathBuf,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Watcher {
    /// Spawn the polling loop, comparing every tick against `initial`.
    /// Must be called inside a tokio runtime.
    ///
    /// `token` is usually a child of the monitor's root token.
    pub fn start(
        id: ResourceId,
        path: PathBuf,
        initial: Snapshot,
        render: SharedRender,
        interval: Duration,
        changes: mpsc::Sender<Command>,
        token: CancellationToken,
    ) -> Self {
        let task = tokio::spawn(poll_loop(
            id.clone(),
            path.clone(),
            initial,
            render,
            interval,
            changes,
            token.clone(),
        ));
        tracing::debug!(id = %id, path = %path.display(), "watcher started");
        Self { id, path, token, task }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking, idempotent cancel.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stop and wait for the polling task to exit.
    pub async fn join(self) {
        self.stop();
        if let Err(err) = self.task.await {
            tracing::error!(id = %self.id, error = %err, "watcher task panicked");
        }
    }
}

async fn poll_loop(
    id: ResourceId,
    path: PathBuf,
    mut snapshot: Snapshot,
    render: SharedRender,
    period: Duration,
    changes: mpsc::Sender<Command>,
    token: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(current) = Snapshot::poll(&path).await else {
            continue;
        };
        if current == snapshot {
            continue;
        }
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(id = %id, error = %err, "read failed; retrying next tick");
                continue;
            }
        };
        snapshot = current;

        let rendered = render.render(&bytes);
        tracing::debug!(id = %id, bytes = bytes.len(), "change detected");
        let command = Command::Changed {
            id: id.clone(),
            rendered,
        };
        tokio::select! {
            _ = token.cancelled() => break,
            sent = changes.send(command) => {
                if sent.is_err() {
                    tracing::debug!(id = %id, "change channel closed; watcher exiting");
                    break;
                }
            }
        }
    }
    tracing::debug!(id = %id, "watcher stopped");
}
