//! Preview server implementation.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::services::ServeDir;

use crate::websocket::{livereload_client_script, ReloadHub, ReloadMessage};

/// Path of the live reload client script.
pub const LIVERELOAD_SCRIPT_PATH: &str = "/__brisk/livereload.js";

/// Path of the live reload WebSocket.
pub const LIVERELOAD_SOCKET_PATH: &str = "/__brisk/livereload";

/// Configuration for the preview server.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Directory served at `/`
    pub root: PathBuf,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Open browser on start
    pub open: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("docs"),
            host: "127.0.0.1".to_string(),
            port: 3000,
            open: true,
        }
    }
}

/// Errors that can occur with the server or the watcher.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Shared server state.
#[derive(Clone)]
struct ServerState {
    hub: ReloadHub,
    script: Arc<str>,
}

/// Serves the destination tree with live reload.
pub struct PreviewServer {
    config: PreviewConfig,
    hub: ReloadHub,
}

impl PreviewServer {
    /// Create a server that relays messages from `hub`.
    pub fn new(config: PreviewConfig, hub: ReloadHub) -> Self {
        Self { config, hub }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    /// Build the router: live reload endpoints, everything else from the
    /// destination root.
    pub fn router(&self) -> Router {
        let state = ServerState {
            hub: self.hub.clone(),
            script: livereload_client_script(LIVERELOAD_SOCKET_PATH).into(),
        };

        Router::new()
            .route(LIVERELOAD_SCRIPT_PATH, get(script_handler))
            .route(LIVERELOAD_SOCKET_PATH, get(ws_handler))
            .fallback_service(ServeDir::new(&self.config.root))
            .layer(middleware::map_response(inject_livereload))
            .with_state(state)
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let url = format!("http://{}", listener.local_addr()?);
        tracing::info!("Serving {} at {}", self.config.root.display(), url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Preview server stopped");
        Ok(())
    }
}

/// Handler for the live reload client script.
async fn script_handler(State(state): State<ServerState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        state.script.to_string(),
    )
}

/// Handler for the live reload WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state.hub))
}

/// Forward hub messages to one browser until either side goes away.
async fn handle_ws(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();

    if !send_message(&mut socket, &ReloadMessage::Connected).await {
        return;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let msg = match msg {
                    Ok(msg) => msg,
                    // Missed messages: a full reload covers all of them.
                    Err(RecvError::Lagged(_)) => ReloadMessage::Reload,
                    Err(RecvError::Closed) => break,
                };
                if !send_message(&mut socket, &msg).await {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("Live reload client disconnected");
}

async fn send_message(socket: &mut WebSocket, msg: &ReloadMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::warn!("Failed to encode reload message: {}", e);
            false
        }
    }
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

/// Add the live reload script to successful HTML responses.
async fn inject_livereload(response: Response) -> Response {
    if response.status() != StatusCode::OK || !is_html(response.headers()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = match std::str::from_utf8(&bytes) {
        Ok(html) if !html.is_empty() => html,
        _ => return Response::from_parts(parts, Body::from(bytes)),
    };

    let injected = inject_script(html, LIVERELOAD_SCRIPT_PATH);
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(injected))
}

/// Insert a script tag for `src` before the last `</body>`, or append it.
pub fn inject_script(html: &str, src: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, src);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..index]);
            out.push_str(&tag);
            out.push_str(&html[index..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}
