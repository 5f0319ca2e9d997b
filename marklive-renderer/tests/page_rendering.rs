//! Preview page rendering with embedded and user-supplied templates.

use marklive_core::{identity, MarkdownConfig, Render};
use marklive_renderer::{MarkdownRenderer, PageContext, PageEngine, RenderError};
use tempfile::TempDir;

fn ctx() -> PageContext {
    PageContext::new("127.0.0.1", 1337, &identity::memory_id("doc"), "doc.md")
}

#[test]
fn user_template_overrides_embedded_page() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("page")).unwrap();
    std::fs::write(
        dir.path().join("page").join("page.html.tera"),
        "custom {{ title }} {{ resource_id }}",
    )
    .unwrap();

    let engine = PageEngine::new(Some(dir.path())).expect("engine");
    let page = engine.render_page(&ctx()).unwrap();
    assert!(page.starts_with("custom doc.md m-"), "{page}");
}

#[test]
fn non_tera_files_in_template_dir_are_ignored() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("README.md"), "{{ broken").unwrap();

    let engine = PageEngine::new(Some(dir.path())).expect("engine");
    assert!(engine.render_page(&ctx()).unwrap().contains("<!DOCTYPE html>"));
}

#[test]
fn missing_template_dir_falls_back_to_embedded() {
    let dir = TempDir::new().expect("tempdir");
    let engine = PageEngine::new(Some(&dir.path().join("nope"))).expect("engine");
    assert!(engine.render_page(&ctx()).is_ok());
}

#[test]
fn invalid_user_template_reports_tera_error() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("broken.html.tera"), "{% if %}").unwrap();

    let err = PageEngine::new(Some(dir.path())).err().expect("must fail");
    assert!(matches!(err, RenderError::Tera(_)), "got: {err}");
}

#[test]
fn rendered_markdown_embeds_in_page() {
    let markdown = MarkdownRenderer::new(&MarkdownConfig::default());
    let html = markdown.render(b"- [x] done\n- [ ] todo\n");
    assert!(html.contains("checkbox"), "{html}");

    let engine = PageEngine::new(None).unwrap();
    let page = engine.render_page(&ctx().with_initial(Some(html.clone()))).unwrap();
    assert!(page.contains(&html));
}
