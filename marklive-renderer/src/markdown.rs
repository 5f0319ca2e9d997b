//! Markdown → HTML via pulldown-cmark.

use pulldown_cmark::{html, Options, Parser};

use marklive_core::{MarkdownConfig, Render};

/// The render function plugged into resource handlers.
///
/// Pure: bytes in, HTML fragment out. Invalid UTF-8 is replaced lossily;
/// callers that must reject it (memory pushes) check before rendering.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownRenderer {
    options: Options,
}

impl MarkdownRenderer {
    pub fn new(config: &MarkdownConfig) -> Self {
        let mut options = Options::empty();
        options.set(Options::ENABLE_TABLES, config.tables);
        options.set(Options::ENABLE_FOOTNOTES, config.footnotes);
        options.set(Options::ENABLE_STRIKETHROUGH, config.strikethrough);
        options.set(Options::ENABLE_TASKLISTS, config.task_lists);
        options.set(Options::ENABLE_SMART_PUNCTUATION, config.smart_punctuation);
        Self { options }
    }

    pub fn render_str(&self, source: &str) -> String {
        let parser = Parser::new_ext(source, self.options);
        let mut out = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(&MarkdownConfig::default())
    }
}

impl Render for MarkdownRenderer {
    fn render(&self, source: &[u8]) -> String {
        self.render_str(&String::from_utf8_lossy(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("# Hi", "<h1>Hi</h1>\n")]
    #[case("**bold**", "<p><strong>bold</strong></p>\n")]
    #[case("*italic*", "<p><em>italic</em></p>\n")]
    #[case("", "")]
    fn renders_basic_markdown(#[case] input: &str, #[case] expected: &str) {
        let renderer = MarkdownRenderer::default();
        assert_eq!(renderer.render(input.as_bytes()), expected);
    }

    #[test]
    fn strikethrough_follows_config() {
        let on = MarkdownRenderer::default();
        assert!(on.render_str("~~gone~~").contains("<del>gone</del>"));

        let off = MarkdownRenderer::new(&MarkdownConfig {
            strikethrough: false,
            ..MarkdownConfig::default()
        });
        assert!(!off.render_str("~~gone~~").contains("<del>"));
    }

    #[test]
    fn tables_render_when_enabled() {
        let html = MarkdownRenderer::default().render_str("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"), "got: {html}");
    }

    #[test]
    fn invalid_utf8_is_rendered_lossily() {
        let html = MarkdownRenderer::default().render(&[b'#', b' ', 0xff, b'x']);
        assert!(html.starts_with("<h1>"));
    }
}
