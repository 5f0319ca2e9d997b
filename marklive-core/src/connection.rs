//! The connection seam between subscriber registries and the wire transport.
//!
//! The transport is assumed ordered, reliable and message-framed. A registry
//! only needs to push a frame, learn whether that failed, and force-close.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{ConnectionId, RenderFrame};

/// Delivery to one connection failed; the connection is presumed dead.
#[derive(Debug, Error)]
#[error("delivery to {connection} failed: {reason}")]
pub struct DeliveryError {
    pub connection: ConnectionId,
    pub reason: String,
}

/// A live client connection subscribed to one resource.
pub trait Connection: Send + Sync + fmt::Debug {
    fn id(&self) -> ConnectionId;

    /// Push one frame. Must not block on the peer.
    fn deliver(&self, frame: &RenderFrame) -> Result<(), DeliveryError>;

    /// Force-close the connection. Closing twice is harmless.
    fn close(&self);
}

pub type SharedConnection = Arc<dyn Connection>;

/// What a [`ChannelConnection`] hands to its transport writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(RenderFrame),
    Close,
}

/// A connection backed by an unbounded channel drained by a transport task.
///
/// Delivery fails once the writer has gone away (receiver dropped).
#[derive(Debug)]
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelConnection {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Self {
            id: ConnectionId::next(),
            tx,
        };
        (connection, rx)
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn deliver(&self, frame: &RenderFrame) -> Result<(), DeliveryError> {
        self.tx
            .send(Outbound::Frame(frame.clone()))
            .map_err(|_| DeliveryError {
                connection: self.id,
                reason: "transport writer closed".to_string(),
            })
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivered_frames_reach_the_receiver_in_order() {
        let (conn, mut rx) = ChannelConnection::new();
        conn.deliver(&RenderFrame::new("one")).unwrap();
        conn.deliver(&RenderFrame::new("two")).unwrap();
        conn.close();

        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame(RenderFrame::new("one")));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame(RenderFrame::new("two")));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
    }

    #[test]
    fn delivery_fails_once_receiver_is_gone() {
        let (conn, rx) = ChannelConnection::new();
        drop(rx);
        let err = conn.deliver(&RenderFrame::new("lost")).unwrap_err();
        assert_eq!(err.connection, conn.id());
    }
}
