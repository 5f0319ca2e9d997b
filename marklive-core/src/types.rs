//! Domain types shared by every marklive crate.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

// ---------------------------------------------------------------------------
// Resource kinds
// ---------------------------------------------------------------------------

/// The kind of source a resource is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Durable markdown file on disk, polled for changes.
    File,
    /// Ephemeral markdown pushed by a client; every push carries the content.
    Memory,
}

impl ResourceKind {
    /// Every kind, in registration order.
    pub fn all() -> &'static [ResourceKind] {
        &[ResourceKind::File, ResourceKind::Memory]
    }

    /// Namespace tag prepended to ids of this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            ResourceKind::File => "f",
            ResourceKind::Memory => "m",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::all().iter().copied().find(|kind| kind.prefix() == prefix)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::File => write!(f, "file"),
            ResourceKind::Memory => write!(f, "memory"),
        }
    }
}

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Length of the hex digest part of a [`ResourceId`].
pub(crate) const DIGEST_HEX_LEN: usize = 64;

/// Stable opaque identifier of a tracked resource: `<kind prefix>-<sha256 hex>`.
///
/// Built by [`crate::identity`]; parse raw ids received from clients with
/// [`FromStr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    kind: ResourceKind,
    raw: String,
}

impl ResourceId {
    pub(crate) fn from_digest(kind: ResourceKind, digest_hex: &str) -> Self {
        Self {
            kind,
            raw: format!("{}-{digest_hex}", kind.prefix()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this id belongs to resources of `kind`.
    pub fn is(&self, kind: ResourceKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

impl FromStr for ResourceId {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let not_tracked = || CommandError::NotTracked { id: s.to_string() };
        let (prefix, digest) = s.split_once('-').ok_or_else(not_tracked)?;
        let kind = ResourceKind::from_prefix(prefix).ok_or_else(not_tracked)?;
        let valid_digest = digest.len() == DIGEST_HEX_LEN
            && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid_digest {
            return Err(not_tracked());
        }
        Ok(Self::from_digest(kind, digest))
    }
}

impl TryFrom<String> for ResourceId {
    type Error = CommandError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.raw
    }
}

/// Process-unique identifier of one live client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Allocate the next id from a process-wide counter.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Wire frame
// ---------------------------------------------------------------------------

/// The message pushed to subscribers: the full rendered artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderFrame {
    pub render: String,
}

impl RenderFrame {
    pub fn new(render: impl Into<String>) -> Self {
        Self {
            render: render.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // A struct with a single String field always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{\"render\":\"\"}"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> String {
        "ab".repeat(DIGEST_HEX_LEN / 2)
    }

    #[test]
    fn resource_id_display_carries_kind_prefix() {
        let id = ResourceId::from_digest(ResourceKind::Memory, &digest());
        assert!(id.to_string().starts_with("m-"));
        assert_eq!(id.kind(), ResourceKind::Memory);
    }

    #[test]
    fn resource_id_parses_its_own_display() {
        let id = ResourceId::from_digest(ResourceKind::File, &digest());
        let parsed: ResourceId = id.to_string().parse().expect("parse");
        assert_eq!(parsed, id);
    }

    #[test]
    fn resource_id_rejects_unknown_namespace() {
        let err = format!("x-{}", digest()).parse::<ResourceId>().unwrap_err();
        assert!(matches!(err, CommandError::NotTracked { .. }), "got: {err}");
    }

    #[test]
    fn resource_id_rejects_short_or_non_hex_digest() {
        assert!("f-abc".parse::<ResourceId>().is_err());
        assert!(format!("f-{}", "zz".repeat(32)).parse::<ResourceId>().is_err());
        assert!("".parse::<ResourceId>().is_err());
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn render_frame_json_shape() {
        let frame = RenderFrame::new("<h1>Hi</h1>");
        assert_eq!(frame.to_json(), r#"{"render":"<h1>Hi</h1>"}"#);
    }
}
