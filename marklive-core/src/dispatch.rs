//! Dispatcher: the command bus that fans each command out to every handler.
//!
//! ```text
//! Api / change pump --dispatch(cmd)--> Dispatcher --spawn--> handler 1 ─┐
//!                                                  --spawn--> handler 2 ─┼─> done + errors
//!                                                  --spawn--> handler N ─┘
//! ```
//!
//! The handler list is append-only during setup (`add_handler` takes
//! `&mut self`) and read-only while serving. `dispatch` never waits on a
//! handler; callers pick their own deadline through [`Dispatch::wait`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::command::{Command, CommandKind};
use crate::error::CommandError;

/// A component that reacts to dispatched commands.
///
/// Handlers serialize their own internal state; the dispatcher invokes every
/// handler concurrently, once per dispatched command.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn serve(&self, command: Arc<Command>) -> Result<(), CommandError>;

    /// Resolves once the handler finished draining after `Shutdown`.
    async fn drained(&self) {}
}

/// Adapter turning a plain closure into a [`Handler`] with a no-op drain.
pub struct FnHandler<F> {
    name: &'static str,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Command) -> Result<(), CommandError> + Send + Sync + 'static,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&Command) -> Result<(), CommandError> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn serve(&self, command: Arc<Command>) -> Result<(), CommandError> {
        (self.f)(&command)
    }
}

/// Ordered list of handlers plus the fan-out.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Vec<Arc<dyn Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Only possible before the dispatcher is shared.
    pub fn add_handler(&mut self, handler: Arc<dyn Handler>) {
        tracing::debug!(handler = handler.name(), "registered dispatch handler");
        self.handlers.push(handler);
    }

    /// Register a closure handler.
    pub fn add_handler_fn<F>(&mut self, name: &'static str, f: F)
    where
        F: Fn(&Command) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        self.add_handler(Arc::new(FnHandler::new(name, f)));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Send `command` to every handler concurrently.
    ///
    /// Must be called from within a tokio runtime. Returns immediately; the
    /// returned [`Dispatch`] completes once every handler returned.
    pub fn dispatch(&self, command: Command) -> Dispatch {
        let kind = command.kind();
        let command = Arc::new(command);
        let (error_tx, error_rx) = mpsc::channel(self.handlers.len().max(1));
        let (done_tx, done_rx) = oneshot::channel();

        let tasks: Vec<(&'static str, JoinHandle<()>)> = self
            .handlers
            .iter()
            .map(|handler| {
                let handler = Arc::clone(handler);
                let command = Arc::clone(&command);
                let error_tx = error_tx.clone();
                let name = handler.name();
                let task = tokio::spawn(async move {
                    if let Err(err) = handler.serve(command).await {
                        tracing::debug!(handler = handler.name(), command = %kind, error = %err, "handler returned error");
                        // Capacity equals the handler count, so this never fails for space.
                        let _ = error_tx.try_send(err);
                    }
                });
                (name, task)
            })
            .collect();
        drop(error_tx);

        tokio::spawn(async move {
            for (name, task) in tasks {
                if let Err(err) = task.await {
                    tracing::error!(handler = name, command = %kind, error = %err, "handler task panicked");
                }
            }
            let _ = done_tx.send(());
        });

        Dispatch {
            kind,
            done: done_rx,
            errors: error_rx,
        }
    }
}

/// Handle on one in-flight fan-out: a completion signal plus an error stream.
pub struct Dispatch {
    kind: CommandKind,
    done: oneshot::Receiver<()>,
    errors: mpsc::Receiver<CommandError>,
}

impl Dispatch {
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Wait for every handler without a deadline and collect their errors.
    pub async fn completed(mut self) -> Vec<CommandError> {
        let _ = (&mut self.done).await;
        let mut errors = Vec::new();
        while let Ok(err) = self.errors.try_recv() {
            errors.push(err);
        }
        errors
    }

    /// Boundary helper: the first handler error, success once every handler
    /// returned, or [`CommandError::Timeout`] when `timeout` expires first.
    ///
    /// On timeout the handlers keep running to completion in the background.
    pub async fn wait(mut self, timeout: Duration) -> Result<(), CommandError> {
        let kind = self.kind;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        tokio::select! {
            biased;
            Some(err) = self.errors.recv() => Err(err),
            _ = &mut self.done => match self.errors.try_recv() {
                Ok(err) => Err(err),
                Err(_) => Ok(()),
            },
            _ = &mut deadline => Err(CommandError::Timeout {
                command: kind,
                after: timeout,
            }),
        }
    }
}
