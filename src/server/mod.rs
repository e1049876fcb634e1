//! HTTP servers
//!
//! Both the build server and the store server run through [`serve`], which
//! ties an axum router to a [`ServerLifecycle`]:
//!
//! ```text
//! Serving --shutdown()--> Draining --drained or deadline--> Stopped
//! ```
//!
//! While draining, no new connections are accepted and in-flight requests
//! get until the drain deadline to finish. At the deadline the lifecycle
//! stops: request handlers still running are dropped (a build in progress
//! kills its toolchain) and answered with 503, and `serve` returns once
//! those responses are out or after a short grace period.

pub mod build_api;
pub mod store_api;

use crate::error::{ForgeError, ForgeResult};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, info_span, warn, Instrument};

/// Time given to cancelled requests to send their response after the drain
/// deadline
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Phase of a server's life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Serving,
    Draining,
    Stopped,
}

/// Shared handle driving a server from serving to stopped
#[derive(Debug, Clone)]
pub struct ServerLifecycle {
    state: watch::Sender<ServerState>,
}

impl Default for ServerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerLifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ServerState::Serving);
        Self { state }
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Begin draining. Has no effect once draining has started.
    pub fn shutdown(&self) {
        self.state.send_if_modified(|state| {
            if *state == ServerState::Serving {
                *state = ServerState::Draining;
                true
            } else {
                false
            }
        });
    }

    fn stopped(&self) {
        self.state.send_replace(ServerState::Stopped);
    }

    /// Resolves once the server has left the serving state
    pub async fn draining(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|state| *state != ServerState::Serving).await;
    }

    /// Resolves once the server has stopped
    pub async fn wait_stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == ServerState::Stopped).await;
    }

    /// Start draining on SIGINT or SIGTERM
    pub fn shutdown_on_signal(&self) {
        let lifecycle = self.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            lifecycle.shutdown();
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            info!("Received SIGINT");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received interrupt");
}

/// Serve `app` on `listener` until the lifecycle stops it
pub async fn serve(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    lifecycle: ServerLifecycle,
    drain_timeout: Duration,
) -> ForgeResult<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| ForgeError::io("reading listener address", e))?;
    info!(%addr, "{} listening", name);

    let app = app.layer(axum::middleware::from_fn_with_state(
        lifecycle.clone(),
        request_span,
    ));
    let drain = lifecycle.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { drain.draining().await })
            .await
    });

    let result = tokio::select! {
        joined = &mut server => joined,
        _ = lifecycle.draining() => {
            info!(timeout = ?drain_timeout, "{} draining", name);
            match tokio::time::timeout(drain_timeout, &mut server).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("{} drain deadline passed, cancelling open requests", name);
                    lifecycle.stopped();
                    if tokio::time::timeout(CLOSE_GRACE, &mut server).await.is_err() {
                        server.abort();
                    }
                    info!("{} stopped", name);
                    return Ok(());
                }
            }
        }
    };

    lifecycle.stopped();
    info!("{} stopped", name);

    result
        .map_err(|e| ForgeError::Internal(format!("{name} task failed: {e}")))?
        .map_err(|e| ForgeError::io(format!("serving {name}"), e))
}

/// Bind a listener on all interfaces
pub async fn bind(port: u16) -> ForgeResult<TcpListener> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| ForgeError::Config(format!("binding port {port}: {e}")))
}

/// Wrap each request in a span carrying a fresh request id, and cancel it
/// when the server stops
async fn request_span(
    State(lifecycle): State<ServerLifecycle>,
    request: Request,
    next: Next,
) -> Response {
    let span = info_span!(
        "request",
        id = %uuid::Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    );

    tokio::select! {
        response = next.run(request).instrument(span.clone()) => response,
        _ = lifecycle.wait_stopped() => {
            span.in_scope(|| warn!("Request cancelled by shutdown"));
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "Error": "server stopped before the request completed",
                    "ErrorKind": "unavailable",
                })),
            )
                .into_response()
        }
    }
}
