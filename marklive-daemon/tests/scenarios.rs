//! End-to-end coordinator scenarios over in-process channel connections.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use marklive_core::{
    ChannelConnection, CommandError, Config, Connection, Outbound, Render, RenderFrame,
    SharedRender,
};
use marklive_daemon::Coordinator;
use marklive_renderer::MarkdownRenderer;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn coordinator() -> Coordinator {
    let config = Config {
        poll_interval_ms: 20,
        dispatch_timeout_ms: 2_000,
        ..Config::default()
    };
    let render: SharedRender = Arc::new(MarkdownRenderer::new(&config.markdown));
    let coordinator = Coordinator::new(config, render);
    coordinator.serve();
    coordinator
}

fn connection() -> (Arc<ChannelConnection>, UnboundedReceiver<Outbound>) {
    let (conn, rx) = ChannelConnection::new();
    (Arc::new(conn), rx)
}

async fn next(rx: &mut UnboundedReceiver<Outbound>) -> Option<Outbound> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten()
}

async fn assert_quiet(rx: &mut UnboundedReceiver<Outbound>) {
    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "unexpected frame: {extra:?}");
}

fn frame(html: &str) -> Option<Outbound> {
    Some(Outbound::Frame(RenderFrame::new(html)))
}

fn rewrite(path: &Path, content: &str) {
    std::fs::write(path, content).expect("rewrite");
    let later = SystemTime::now() + Duration::from_secs(10);
    filetime::set_file_mtime(path, FileTime::from_system_time(later)).expect("set mtime");
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn file_hi_then_bye() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.md");
    std::fs::write(&path, "# Hi").unwrap();

    let coordinator = coordinator();
    let api = coordinator.api();
    let id = api.add_file(&path).await.expect("add");

    let (conn, mut rx) = connection();
    api.subscribe(id.clone(), conn).await.expect("subscribe");
    assert_eq!(next(&mut rx).await, frame("<h1>Hi</h1>\n"));
    assert_quiet(&mut rx).await;

    rewrite(&path, "# Bye");
    assert_eq!(next(&mut rx).await, frame("<h1>Bye</h1>\n"));
    assert_quiet(&mut rx).await;

    coordinator.shutdown().await;
}

#[tokio::test]
async fn edit_racing_the_initial_read_is_still_delivered() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.md");
    std::fs::write(&path, "# Hi").unwrap();

    // The first render happens after the handler read "# Hi"; rewriting the
    // file right there lands the edit between the read and the watcher start.
    let config = Config {
        poll_interval_ms: 20,
        dispatch_timeout_ms: 2_000,
        ..Config::default()
    };
    let markdown = MarkdownRenderer::new(&config.markdown);
    let edited = AtomicBool::new(false);
    let target = path.clone();
    let render: SharedRender = Arc::new(move |source: &[u8]| {
        if !edited.swap(true, Ordering::SeqCst) {
            rewrite(&target, "# Bye");
        }
        markdown.render(source)
    });
    let coordinator = Coordinator::new(config, render);
    coordinator.serve();
    let api = coordinator.api();

    let id = api.add_file(&path).await.expect("add");
    let (conn, mut rx) = connection();
    api.subscribe(id, conn).await.expect("subscribe");

    let mut last = None;
    while let Some(outbound) = next(&mut rx).await {
        let done = outbound == Outbound::Frame(RenderFrame::new("<h1>Bye</h1>\n"));
        last = Some(outbound);
        if done {
            break;
        }
    }
    assert_eq!(last, frame("<h1>Bye</h1>\n"), "disk holds # Bye");
    assert_quiet(&mut rx).await;

    coordinator.shutdown().await;
}

#[tokio::test]
async fn memory_bold_then_italic_without_resubscribing() {
    let coordinator = coordinator();
    let api = coordinator.api();
    let id = api.add_memory("x", b"**bold**".to_vec()).await.expect("add");

    let (conn, mut rx) = connection();
    api.subscribe(id.clone(), conn).await.expect("subscribe");
    assert_eq!(next(&mut rx).await, frame("<p><strong>bold</strong></p>\n"));

    api.add_memory("x", b"*italic*".to_vec()).await.expect("update");
    assert_eq!(next(&mut rx).await, frame("<p><em>italic</em></p>\n"));
    assert_quiet(&mut rx).await;

    coordinator.shutdown().await;
}

#[tokio::test]
async fn delete_then_subscribe_is_not_tracked() {
    let coordinator = coordinator();
    let api = coordinator.api();
    let id = api.add_memory("gone", b"# soon".to_vec()).await.unwrap();

    let (early, mut early_rx) = connection();
    api.subscribe(id.clone(), early).await.unwrap();
    assert!(next(&mut early_rx).await.is_some());

    api.remove(id.clone()).await.unwrap();
    assert_eq!(next(&mut early_rx).await, Some(Outbound::Close));
    api.remove(id.clone()).await.expect("second remove is a no-op");

    let (late, mut late_rx) = connection();
    let err = api.subscribe(id, late).await.unwrap_err();
    assert!(matches!(err, CommandError::NotTracked { .. }), "got: {err}");
    assert_eq!(next(&mut late_rx).await, Some(Outbound::Close));
}

#[tokio::test]
async fn readding_a_file_keeps_one_watcher() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.md");
    std::fs::write(&path, "# Hi").unwrap();

    let coordinator = coordinator();
    let api = coordinator.api();
    let first = api.add_file(&path).await.unwrap();
    let second = api.add_file(&dir.path().join(".").join("a.md")).await.unwrap();

    assert_eq!(first, second);
    let status = coordinator.status();
    assert_eq!(status.watchers, 1);
    assert_eq!(status.resources.len(), 1);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn dead_connection_is_dropped_healthy_one_keeps_receiving() {
    let coordinator = coordinator();
    let api = coordinator.api();
    let id = api.add_memory("n", b"one".to_vec()).await.unwrap();

    let (healthy, mut healthy_rx) = connection();
    let (dead, dead_rx) = connection();
    api.subscribe(id.clone(), healthy).await.unwrap();
    api.subscribe(id.clone(), dead).await.unwrap();
    drop(dead_rx);
    assert_eq!(coordinator.status().resources[0].subscribers, 2);

    api.add_memory("n", b"two".to_vec()).await.unwrap();
    assert_eq!(next(&mut healthy_rx).await, frame("<p>one</p>\n"));
    assert_eq!(next(&mut healthy_rx).await, frame("<p>two</p>\n"));
    assert_eq!(coordinator.status().resources[0].subscribers, 1);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn unsubscribe_detaches_connection() {
    let coordinator = coordinator();
    let api = coordinator.api();
    let id = api.add_memory("u", b"one".to_vec()).await.unwrap();

    let (conn, mut rx) = connection();
    let connection_id = conn.id();
    api.subscribe(id.clone(), conn).await.unwrap();
    assert!(next(&mut rx).await.is_some());

    api.unsubscribe(id.clone(), connection_id).await.unwrap();
    api.add_memory("u", b"two".to_vec()).await.unwrap();
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn shutdown_closes_every_connection_and_drains() {
    let dir = TempDir::new().unwrap();
    let coordinator = coordinator();
    let api = coordinator.api();

    let mut receivers = Vec::new();
    for name in ["a.md", "b.md"] {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("# {name}")).unwrap();
        let id = api.add_file(&path).await.unwrap();
        for _ in 0..2 {
            let (conn, rx) = connection();
            api.subscribe(id.clone(), conn).await.unwrap();
            receivers.push(rx);
        }
    }
    let id = api.add_memory("m", b"# m".to_vec()).await.unwrap();
    let (conn, rx) = connection();
    api.subscribe(id, conn).await.unwrap();
    receivers.push(rx);

    tokio::time::timeout(Duration::from_secs(5), coordinator.shutdown())
        .await
        .expect("barrier completes within the timeout");
    tokio::time::timeout(Duration::from_millis(100), coordinator.wait())
        .await
        .expect("wait released");

    for rx in &mut receivers {
        assert!(matches!(next(rx).await, Some(Outbound::Frame(_))));
        assert_eq!(next(rx).await, Some(Outbound::Close));
    }
    let status = coordinator.status();
    assert!(status.stopping);
    assert_eq!(status.watchers, 0);
    assert!(status.resources.is_empty());

    let err = api.add_memory("late", b"x".to_vec()).await.unwrap_err();
    assert_eq!(err, CommandError::Closed("dispatcher"));
}

#[tokio::test]
async fn concurrent_shutdown_callers_all_return() {
    let coordinator = Arc::new(coordinator());
    let a = tokio::spawn({
        let c = coordinator.clone();
        async move { c.shutdown().await }
    });
    let b = tokio::spawn({
        let c = coordinator.clone();
        async move { c.shutdown().await }
    });
    tokio::time::timeout(Duration::from_secs(2), async {
        a.await.unwrap();
        b.await.unwrap();
    })
    .await
    .expect("both callers released");
}

#[tokio::test]
async fn get_id_asks_file_then_memory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.md");
    std::fs::write(&path, "# Hi").unwrap();

    let coordinator = coordinator();
    let api = coordinator.api();
    let file_id = api.add_file(&path).await.unwrap();
    let mem_id = api.add_memory("scratch", b"x".to_vec()).await.unwrap();

    assert_eq!(coordinator.get_id(path.to_str().unwrap()), Some(file_id.clone()));
    assert_eq!(coordinator.get_id(file_id.as_str()), Some(file_id));
    assert_eq!(coordinator.get_id("scratch"), Some(mem_id.clone()));
    assert_eq!(coordinator.get_id(mem_id.as_str()), Some(mem_id));
    assert_eq!(coordinator.get_id("untracked"), None);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn bad_inputs_are_reported() {
    let dir = TempDir::new().unwrap();
    let coordinator = coordinator();
    let api = coordinator.api();

    let err = api.add_file(&dir.path().join("missing.md")).await.unwrap_err();
    assert!(matches!(err, CommandError::BadInput(_)), "got: {err}");

    let err = api.add_memory("k", vec![0xff, 0xfe]).await.unwrap_err();
    assert!(matches!(err, CommandError::BadInput(_)), "got: {err}");

    let err = api.add_memory("", b"x".to_vec()).await.unwrap_err();
    assert!(matches!(err, CommandError::BadInput(_)), "got: {err}");
}
