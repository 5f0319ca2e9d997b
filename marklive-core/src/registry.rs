//! Per-resource subscriber registry.
//!
//! One registry per tracked [`ResourceId`], owned by exactly one handler.
//! It holds the live connections subscribed to that resource plus the last
//! rendered content, so late joiners see the current state immediately.
//!
//! Every operation runs under the registry's own lock: a subscribe can never
//! interleave with a broadcast, and a failed delivery drops only the
//! connection it failed on.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::connection::SharedConnection;
use crate::error::CommandError;
use crate::types::{ConnectionId, RenderFrame, ResourceId, ResourceKind};

/// Result of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Serializable view used by status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub id: String,
    pub kind: ResourceKind,
    pub label: String,
    pub subscribers: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, SharedConnection>,
    last_rendered: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    closed: bool,
}

pub struct SubscriberRegistry {
    id: ResourceId,
    /// Human-readable origin (canonical path or memory key).
    label: String,
    state: Mutex<RegistryState>,
}

impl SubscriberRegistry {
    pub fn new(id: ResourceId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// A registry whose cache is already seeded with `rendered`.
    pub fn with_content(id: ResourceId, label: impl Into<String>, rendered: String) -> Self {
        let registry = Self::new(id, label);
        {
            let mut state = registry.state.lock();
            state.last_rendered = Some(rendered);
            state.updated_at = Some(Utc::now());
        }
        registry
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Insert `connection`, then deliver the cached render to it alone.
    ///
    /// A closed registry refuses new subscribers: the connection is closed
    /// and `NotTracked` is returned.
    pub fn add(&self, connection: SharedConnection) -> Result<(), CommandError> {
        let mut state = self.state.lock();
        if state.closed {
            connection.close();
            return Err(CommandError::not_tracked(&self.id));
        }

        let connection_id = connection.id();
        if let Some(rendered) = state.last_rendered.as_ref() {
            if let Err(err) = connection.deliver(&RenderFrame::new(rendered.as_str())) {
                tracing::debug!(id = %self.id, error = %err, "initial delivery failed; dropping subscriber");
                return Ok(());
            }
        }
        state.connections.insert(connection_id, connection);
        tracing::debug!(id = %self.id, connection = %connection_id, subscribers = state.connections.len(), "subscriber added");
        Ok(())
    }

    /// Forget `connection_id` without closing it. Returns whether it was held.
    pub fn remove(&self, connection_id: ConnectionId) -> bool {
        let removed = self.state.lock().connections.remove(&connection_id).is_some();
        if removed {
            tracing::debug!(id = %self.id, connection = %connection_id, "subscriber removed");
        }
        removed
    }

    /// Cache `rendered` and push it to every held connection. Connections
    /// whose delivery fails are dropped; the rest still receive the frame.
    pub fn broadcast(&self, rendered: String) -> BroadcastReport {
        let mut state = self.state.lock();
        if state.closed {
            return BroadcastReport::default();
        }

        let frame = RenderFrame::new(rendered);
        let mut report = BroadcastReport::default();
        state.connections.retain(|_, connection| match connection.deliver(&frame) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(err) => {
                tracing::debug!(error = %err, "dropping dead subscriber");
                report.dropped += 1;
                false
            }
        });
        state.last_rendered = Some(frame.render);
        state.updated_at = Some(Utc::now());
        report
    }

    /// Force-close every connection and clear the set. Terminal.
    pub fn close(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let count = state.connections.len();
        for (_, connection) in state.connections.drain() {
            connection.close();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.state.lock().connections.contains_key(&connection_id)
    }

    pub fn last_rendered(&self) -> Option<String> {
        self.state.lock().last_rendered.clone()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.lock();
        RegistrySnapshot {
            id: self.id.to_string(),
            kind: self.id.kind(),
            label: self.label.clone(),
            subscribers: state.connections.len(),
            updated_at: state.updated_at,
        }
    }
}
