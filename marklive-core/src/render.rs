//! The render seam: markdown bytes in, rendered HTML out.

use std::sync::Arc;

/// A pure render function. Implemented by `marklive-renderer`; tests may
/// plug in a closure.
pub trait Render: Send + Sync {
    fn render(&self, source: &[u8]) -> String;
}

impl<F> Render for F
where
    F: Fn(&[u8]) -> String + Send + Sync,
{
    fn render(&self, source: &[u8]) -> String {
        self(source)
    }
}

pub type SharedRender = Arc<dyn Render>;
