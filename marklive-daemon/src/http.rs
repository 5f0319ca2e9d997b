//! HTTP surface: the preview page, the WebSocket subscriber endpoint,
//! static assets and id lookup.
//!
//! | route              | response                                        |
//! |--------------------|-------------------------------------------------|
//! | `GET /?id=`        | preview page for a tracked resource             |
//! | `GET /connect?id=` | WebSocket; `{"render": …}` text frames          |
//! | `GET /static/*`    | file from `assets_dir` or a tracked file's dir  |
//! | `GET /getid?path=` | `{"id": …}` or 404                              |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use marklive_core::{ChannelConnection, Connection, Outbound, ResourceId, SharedConnection};
use marklive_renderer::{PageContext, PageEngine};

use crate::api::Api;
use crate::error::DaemonError;
use crate::handlers::AssetPaths;

#[derive(Clone)]
pub struct AppState {
    pub api: Api,
    pub pages: Arc<PageEngine>,
    pub assets: Arc<AssetPaths>,
    /// Host and port the page tells the browser to connect back to.
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
struct IdQuery {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(page))
        .route("/connect", get(connect))
        .route("/static/*path", get(asset))
        .route("/getid", get(get_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| DaemonError::Bind { addr, source })?;
    tracing::info!(addr = %addr, "http server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .map_err(|source| DaemonError::Io {
            path: "http server".into(),
            source,
        })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn parse_id(raw: Option<String>) -> Result<ResourceId, Response> {
    let raw = raw.ok_or_else(|| (StatusCode::BAD_REQUEST, "missing `id`").into_response())?;
    raw.parse::<ResourceId>()
        .map_err(|err| (StatusCode::NOT_FOUND, err.to_string()).into_response())
}

async fn page(State(state): State<AppState>, Query(query): Query<IdQuery>) -> Response {
    let id = match parse_id(query.id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some((title, initial)) = state.api.preview(&id) else {
        return (StatusCode::NOT_FOUND, format!("resource not tracked: {id}")).into_response();
    };

    let ctx = PageContext::new(state.host.clone(), state.port, &id, title).with_initial(initial);
    match state.pages.render_page(&ctx) {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            tracing::error!(id = %id, error = %err, "page render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn connect(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match parse_id(query.id) {
        Ok(id) => ws.on_upgrade(move |socket| session(socket, state.api, id)),
        Err(response) => response,
    }
}

async fn asset(State(state): State<AppState>, UrlPath(rel): UrlPath<String>) -> Response {
    let Some(path) = state.assets.resolve(&rel) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response()
        }
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "asset read failed");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn get_id(State(state): State<AppState>, Query(query): Query<PathQuery>) -> Response {
    let Some(raw) = query.path else {
        return (StatusCode::BAD_REQUEST, "missing `path`").into_response();
    };
    match state.api.get_id(&raw) {
        Some(id) => Json(json!({ "id": id })).into_response(),
        None => (StatusCode::NOT_FOUND, format!("not found: {raw}")).into_response(),
    }
}

// ---------------------------------------------------------------------------
// WebSocket session
// ---------------------------------------------------------------------------

/// One live subscriber: a writer task drains the connection's outbound queue
/// into the socket while this task watches the read side. When the peer goes
/// away the connection is unsubscribed.
async fn session(socket: WebSocket, api: Api, id: ResourceId) {
    let (connection, mut outbound) = ChannelConnection::new();
    let connection = Arc::new(connection);
    let connection_id = connection.id();
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            match message {
                Outbound::Frame(frame) => {
                    if sink.send(Message::Text(frame.to_json())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let shared: SharedConnection = connection.clone();
    if let Err(err) = api.subscribe(id.clone(), shared).await {
        tracing::debug!(id = %id, connection = %connection_id, error = %err, "subscribe refused");
        connection.close();
        drop(connection);
        let _ = writer.await;
        return;
    }
    tracing::debug!(id = %id, connection = %connection_id, "websocket subscribed");

    let mut writer_done = false;
    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    if let Err(err) = api.unsubscribe(id.clone(), connection_id).await {
        tracing::debug!(id = %id, error = %err, "unsubscribe failed");
    }
    drop(connection);
    if !writer_done {
        writer.abort();
    }
    tracing::debug!(id = %id, connection = %connection_id, "websocket closed");
}
