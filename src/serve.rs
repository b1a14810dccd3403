//! Development server with live reload
//!
//! Serves a directory of the output tree and tells connected browsers to
//! reload after a pass completes. HTML responses get a small client script
//! that listens on a server-sent-events endpoint.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::Stream;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tower_http::services::ServeDir;

use crate::config::schema::ServeConfig;

/// Endpoint the injected client subscribes to.
pub const RELOAD_PATH: &str = "/__stylebook/reload";

/// Largest HTML body the reload script is injected into.
const MAX_INJECT_BYTES: usize = 16 * 1024 * 1024;

const RELOAD_CLIENT: &str = r#"<script>(function(){var s=new EventSource("/__stylebook/reload");s.addEventListener("reload",function(){location.reload();});})();</script>"#;

/// Error from the development server
#[derive(Debug, Error)]
pub enum ServeError {
    /// Host and port do not form a socket address
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),
    /// Could not bind the listener
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// The server stopped with an error
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Broadcasts reload notifications to every connected client.
#[derive(Debug, Clone)]
pub struct ReloadChannel {
    tx: broadcast::Sender<()>,
}

impl ReloadChannel {
    /// Create a channel with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Subscribe to reload notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify all subscribers, returning how many there were.
    pub fn send(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }
}

impl Default for ReloadChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests a reload from the scheduler; never blocks.
#[derive(Debug, Clone)]
pub struct ReloadHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ReloadHandle {
    /// A pass settled; ask for a reload.
    pub fn notify(&self) {
        if self.tx.send(()).is_err() {
            tracing::debug!("reload scheduler stopped");
        }
    }
}

/// Turns reload requests into broadcasts.
///
/// Each request waits out the settle delay; requests arriving meanwhile are
/// folded into the same broadcast, and two broadcasts are never closer than
/// the throttle window.
#[derive(Debug)]
pub struct ReloadScheduler {
    channel: ReloadChannel,
    delay: Duration,
    throttle: Duration,
}

impl ReloadScheduler {
    /// Create a scheduler.
    pub fn new(channel: ReloadChannel, delay: Duration, throttle: Duration) -> Self {
        Self { channel, delay, throttle }
    }

    /// Create a scheduler with the configured delay and throttle.
    pub fn from_config(channel: ReloadChannel, config: &ServeConfig) -> Self {
        Self::new(
            channel,
            Duration::from_millis(config.reload_delay_ms),
            Duration::from_millis(config.reload_throttle_ms),
        )
    }

    /// Run the scheduler on the current runtime.
    pub fn spawn(self) -> ReloadHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        ReloadHandle { tx }
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<()>) {
        let mut last: Option<Instant> = None;
        while rx.recv().await.is_some() {
            tokio::time::sleep(self.delay).await;
            if let Some(last) = last {
                tokio::time::sleep_until(last + self.throttle).await;
            }
            while rx.try_recv().is_ok() {}

            let clients = self.channel.send();
            tracing::info!(clients, "reload broadcast");
            last = Some(Instant::now());
        }
    }
}

/// Build the router: reload events plus static files from `root`.
pub fn router(root: PathBuf, channel: ReloadChannel) -> Router {
    Router::new()
        .route(RELOAD_PATH, get(reload_events))
        .fallback_service(ServeDir::new(root).append_index_html_on_directories(true))
        .layer(middleware::from_fn(inject_reload_client))
        .with_state(channel)
}

/// Serve `root` until Ctrl+C.
pub async fn serve(
    config: &ServeConfig,
    root: PathBuf,
    channel: ReloadChannel,
) -> Result<(), ServeError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServeError::InvalidAddress(format!("{}:{}", config.host, config.port)))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })?;

    if !root.is_dir() {
        tracing::warn!(root = %root.display(), "serve root does not exist yet");
    }
    tracing::info!("Serving {} at http://{}", root.display(), addr);
    println!("Serving {} at http://{}", root.display(), addr);

    axum::serve(listener, router(root, channel))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(ServeError::Serve)
}

async fn reload_events(
    State(channel): State<ReloadChannel>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!("reload client connected");
    let stream = futures::stream::unfold(channel.subscribe(), |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(()) => return Some((Ok(Event::default().event("reload").data("reload")), rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn inject_reload_client(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_INJECT_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("failed to read HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let html = inject_script(&bytes);
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Insert the reload client before the last `</body>`, or append it.
///
/// Works on raw bytes; the page's encoding is left alone.
pub fn inject_script(html: &[u8]) -> Vec<u8> {
    const CLOSE: &[u8] = b"</body>";
    let at = html
        .windows(CLOSE.len())
        .rposition(|w| w.eq_ignore_ascii_case(CLOSE))
        .unwrap_or(html.len());

    let mut out = Vec::with_capacity(html.len() + RELOAD_CLIENT.len());
    out.extend_from_slice(&html[..at]);
    out.extend_from_slice(RELOAD_CLIENT.as_bytes());
    out.extend_from_slice(&html[at..]);
    out
}
