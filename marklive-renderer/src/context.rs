//! Page context: serializable payload for the preview page template.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marklive_core::ResourceId;

use crate::error::RenderError;

/// Everything the preview page needs to open its live connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContext {
    /// Host the browser should connect back to.
    pub host: String,
    pub port: u16,
    /// Resource the page subscribes to.
    pub resource_id: String,
    /// `<title>` text; the file name or memory key.
    pub title: String,
    /// Initial HTML, shown before the first frame arrives.
    pub initial: Option<String>,
    pub meta: MetaCtx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaCtx {
    pub marklive_version: String,
    pub generated_at: DateTime<Utc>,
}

impl PageContext {
    pub fn new(host: impl Into<String>, port: u16, id: &ResourceId, title: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            resource_id: id.to_string(),
            title: title.into(),
            initial: None,
            meta: MetaCtx {
                marklive_version: env!("CARGO_PKG_VERSION").to_string(),
                generated_at: Utc::now(),
            },
        }
    }

    pub fn with_initial(mut self, html: Option<String>) -> Self {
        self.initial = html;
        self
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marklive_core::identity;

    #[test]
    fn context_fields_populated() {
        let id = identity::memory_id("notes");
        let ctx = PageContext::new("localhost", 1337, &id, "notes");
        assert_eq!(ctx.resource_id, id.as_str());
        assert_eq!(ctx.port, 1337);
        assert!(ctx.initial.is_none());
        ctx.to_tera_context().expect("context conversion");
    }
}
