use std::fs;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use marklive_core::{config, Config, ResourceId, SharedRender};
use marklive_renderer::{MarkdownRenderer, PageEngine};

use crate::coordinator::Coordinator;
use crate::error::{io_err, DaemonError};
use crate::http::{self, AppState};
use crate::paths::{marklive_root, socket_path, HTTP_HOST};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// What `marklive start` asks of a fresh daemon.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Overrides `port` from the config file.
    pub port: Option<u16>,
    /// Files tracked before the servers accept clients.
    pub files: Vec<PathBuf>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, options: StartOptions) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), options))
}

/// Load the config under `home`, apply `options` and run until stopped.
pub async fn run(home: PathBuf, options: StartOptions) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let mut config = config::load_at(&home)?;
    if let Some(port) = options.port {
        config.port = port;
    }
    run_with_config(home, config, options.files).await
}

/// Run the daemon with an explicit configuration.
pub async fn run_with_config(
    home: PathBuf,
    config: Config,
    files: Vec<PathBuf>,
) -> Result<(), DaemonError> {
    let render: SharedRender = Arc::new(MarkdownRenderer::new(&config.markdown));
    let pages = Arc::new(PageEngine::new(config.template_dir.as_deref())?);
    let coordinator = Arc::new(Coordinator::new(config.clone(), render));
    let pump_handle = coordinator.serve();

    for file in &files {
        let id = coordinator.add_file(file).await?;
        tracing::info!(id = %id, path = %file.display(), "initial file tracked");
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let http_handle = {
        let shutdown = shutdown_tx.clone();
        let ip: IpAddr = HTTP_HOST
            .parse()
            .map_err(|err| DaemonError::Protocol(format!("invalid http host: {err}")))?;
        let addr = SocketAddr::new(ip, config.port);
        let state = AppState {
            api: coordinator.api(),
            pages,
            assets: coordinator.assets(),
            host: HTTP_HOST.to_string(),
            port: config.port,
        };
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = http::serve(addr, state, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let coordinator = coordinator.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = socket_server_task(home, coordinator, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    // Fires the shared shutdown once the barrier completed, however it was
    // triggered (socket `stop`, ctrl-c).
    let barrier_handle = {
        let shutdown = shutdown_tx.clone();
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => {}
                _ = coordinator.wait() => {
                    let _ = shutdown.send(());
                }
            }
            Ok::<(), DaemonError>(())
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            coordinator.shutdown().await;
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (http_result, socket_result, barrier_result, signal_result) =
        tokio::join!(http_handle, socket_handle, barrier_handle, signal_handle);

    // A server failure also ends the daemon; drain the handlers either way.
    coordinator.shutdown().await;
    if let Some(pump) = pump_handle {
        let _ = pump.await;
    }

    handle_join("http_server", http_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("shutdown_barrier", barrier_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Control socket
// ---------------------------------------------------------------------------

async fn socket_server_task(
    home: PathBuf,
    coordinator: Arc<Coordinator>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, coordinator).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    coordinator: Arc<Coordinator>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stop = request.cmd == "stop";
        let response = handle_request(&coordinator, request).await;
        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

/// Map one control request onto the coordinator.
pub(crate) async fn handle_request(coordinator: &Coordinator, request: DaemonRequest) -> DaemonResponse {
    let api = coordinator.api();
    match request.cmd.as_str() {
        "status" => match serde_json::to_value(coordinator.status()) {
            Ok(mut payload) => {
                payload["port"] = json!(coordinator.config().port);
                payload["pid"] = json!(std::process::id());
                DaemonResponse::ok(payload)
            }
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        "add" => {
            let Some(path) = request.path else {
                return missing("path");
            };
            match api.add_file(Path::new(&path)).await {
                Ok(id) => DaemonResponse::ok(id_payload(&id, coordinator)),
                Err(err) => DaemonResponse::rejected(&err),
            }
        }
        "send" => {
            let (Some(key), Some(data)) = (request.key, request.data) else {
                return missing("key` and `data");
            };
            match api.add_memory(&key, data.into_bytes()).await {
                Ok(id) => DaemonResponse::ok(id_payload(&id, coordinator)),
                Err(err) => DaemonResponse::rejected(&err),
            }
        }
        "remove" => {
            let Some(raw) = request.id else {
                return missing("id");
            };
            let Some(id) = api.get_id(&raw) else {
                // Removing something untracked is a no-op.
                return DaemonResponse::ok(json!({ "removed": false }));
            };
            match api.remove(id).await {
                Ok(()) => DaemonResponse::ok(json!({ "removed": true })),
                Err(err) => DaemonResponse::rejected(&err),
            }
        }
        "getid" => {
            let Some(raw) = request.id else {
                return missing("id");
            };
            match api.get_id(&raw) {
                Some(id) => DaemonResponse::ok(id_payload(&id, coordinator)),
                None => DaemonResponse::error(format!("not found: {raw}")).with_code("not_found"),
            }
        }
        "stop" => {
            coordinator.shutdown().await;
            DaemonResponse::ok(json!({ "stopped": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

fn missing(field: &str) -> DaemonResponse {
    DaemonResponse::error(format!("missing `{field}`")).with_code("bad_input")
}

fn id_payload(id: &ResourceId, coordinator: &Coordinator) -> serde_json::Value {
    json!({
        "id": id,
        "url": format!("http://{HTTP_HOST}:{}/?id={id}", coordinator.config().port),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = marklive_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// `RUST_LOG` filters (default `info`); `MARKLIVE_LOG=json` switches to
/// JSON lines.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("MARKLIVE_LOG").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt().json().with_env_filter(filter).with_target(false).try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
