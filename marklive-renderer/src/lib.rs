//! # marklive-renderer
//!
//! Markdown rendering plus the tera-based preview page.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use marklive_core::{identity, MarkdownConfig, Render};
//! use marklive_renderer::{MarkdownRenderer, PageContext, PageEngine};
//!
//! fn preview(source: &str) {
//!     let markdown = MarkdownRenderer::new(&MarkdownConfig::default());
//!     let html = markdown.render(source.as_bytes());
//!     if let Ok(engine) = PageEngine::new(None) {
//!         let id = identity::memory_id("scratch");
//!         let ctx = PageContext::new("localhost", 1337, &id, "scratch").with_initial(Some(html));
//!         if let Ok(page) = engine.render_page(&ctx) {
//!             println!("{} bytes", page.len());
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod markdown;

pub use context::PageContext;
pub use engine::PageEngine;
pub use error::RenderError;
pub use markdown::MarkdownRenderer;
