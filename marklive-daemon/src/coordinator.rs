//! Coordinator: wires the handlers into one dispatcher and owns the
//! lifecycle `new → serve → shutdown`.
//!
//! ```text
//! watchers --Changed--> change queue --pump--> Api --dispatch--> handlers
//! socket / http -------------------------------^
//! ```

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use marklive_core::{Command, CommandError, Config, Dispatcher, Handler, ResourceId, SharedRender};

use crate::api::{Api, Inner, StatusReport};
use crate::handlers::{AssetPaths, HandlerDeps, ResourceHandler, RESOURCE_HANDLERS};

/// Detector changes buffered between watchers and the pump.
const CHANGE_QUEUE: usize = 256;

pub struct Coordinator {
    config: Config,
    api: Api,
    assets: Arc<AssetPaths>,
    changes: Mutex<Option<mpsc::Receiver<Command>>>,
}

impl Coordinator {
    /// Build every handler and register it. Does not spawn anything.
    pub fn new(config: Config, render: SharedRender) -> Self {
        let (change_tx, change_rx) = mpsc::channel(CHANGE_QUEUE);
        let deps = HandlerDeps {
            render,
            poll_interval: config.poll_interval(),
            changes: change_tx,
        };

        let mut dispatcher = Dispatcher::new();
        let mut resources: Vec<Arc<dyn ResourceHandler>> = Vec::new();
        let mut handlers: Vec<Arc<dyn Handler>> = Vec::new();
        for (kind, ctor) in RESOURCE_HANDLERS {
            let handler = ctor(&deps);
            tracing::debug!(kind = %kind, "resource handler built");
            resources.push(Arc::clone(&handler));
            let handler = handler.into_handler();
            handlers.push(Arc::clone(&handler));
            dispatcher.add_handler(handler);
        }

        let assets = Arc::new(AssetPaths::new(config.assets_dir.clone()));
        handlers.push(assets.clone());
        dispatcher.add_handler(assets.clone());

        let api = Api::new(Inner {
            dispatcher,
            resources,
            handlers,
            timeout: config.dispatch_timeout(),
            started_at: Utc::now(),
            stopping: AtomicBool::new(false),
            stopped: CancellationToken::new(),
        });

        Self {
            config,
            api,
            assets,
            changes: Mutex::new(Some(change_rx)),
        }
    }

    /// Start the change pump. Calling it again is a no-op that returns `None`.
    pub fn serve(&self) -> Option<JoinHandle<()>> {
        let rx = self.changes.lock().take()?;
        Some(tokio::spawn(change_pump(self.api.clone(), rx)))
    }

    pub fn api(&self) -> Api {
        self.api.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn assets(&self) -> Arc<AssetPaths> {
        self.assets.clone()
    }

    pub async fn add_file(&self, path: &Path) -> Result<ResourceId, CommandError> {
        self.api.add_file(path).await
    }

    pub fn get_id(&self, raw: &str) -> Option<ResourceId> {
        self.api.get_id(raw)
    }

    pub fn status(&self) -> StatusReport {
        self.api.status()
    }

    /// Run the shutdown barrier. Returns once every handler drained.
    pub async fn shutdown(&self) {
        self.api.shutdown().await;
    }

    /// Resolves once [`Coordinator::shutdown`] completed, whoever triggered it.
    pub async fn wait(&self) {
        self.api.stopped().await;
    }
}

async fn change_pump(api: Api, mut rx: mpsc::Receiver<Command>) {
    loop {
        let command = tokio::select! {
            _ = api.stopped() => break,
            received = rx.recv() => match received {
                Some(command) => command,
                None => break,
            },
        };
        api.forward_change(command).await;
    }
    tracing::debug!("change pump stopped");
}
