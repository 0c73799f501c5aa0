//! Axum transport: WebSocket upgrade, health check, static fallback.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use parley_settings::{RelayMode, RelaySettings};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::ServerError;
use crate::hub::{self, DEFAULT_HUB_CAPACITY, HubEvent};
use crate::janitor;
use crate::relay::Relay;
use crate::session;

/// How long [`ServerHandle::shutdown`] waits for tasks before giving up.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port; `0` picks a free one.
    pub port: u16,
    /// Advertised scheme, logged only.
    pub protocol: String,
    /// Relay mode.
    pub mode: RelayMode,
    /// WebSocket upgrade path.
    pub ws_path: String,
    /// Directory served for every other path.
    pub static_dir: Option<PathBuf>,
    /// Ping cadence per socket.
    pub heartbeat_interval: Duration,
    /// Janitor cadence.
    pub sweep_interval: Duration,
    /// Per-connection outbound queue depth.
    pub max_send_queue: usize,
    /// Largest accepted inbound frame.
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Flatten loaded settings into a runtime config.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            protocol: server.protocol.clone(),
            mode: settings.mode,
            ws_path: server.ws_path.clone(),
            static_dir: server.static_dir.as_ref().map(PathBuf::from),
            heartbeat_interval: Duration::from_millis(server.heartbeat_interval_ms),
            sweep_interval: Duration::from_millis(settings.janitor.interval_ms),
            max_send_queue: server.max_send_queue,
            max_message_size: server.max_message_size,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&RelaySettings::default())
    }
}

/// Shared state for handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hub inbox.
    pub hub: mpsc::Sender<HubEvent>,
    /// Active configuration.
    pub config: ServerConfig,
    /// Fires on server shutdown; sessions close their sockets.
    pub shutdown: CancellationToken,
}

/// `/health` body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`.
    pub status: &'static str,
    /// Registry entries with an open connection.
    pub connections: usize,
    /// Registry entries.
    pub clients: usize,
    /// Registry entries currently paired.
    pub paired: usize,
    /// Relay mode.
    pub mode: RelayMode,
}

/// Build the router for `state`.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(&state.config.ws_path, get(ws_handler))
        .route("/health", get(health_handler));
    if let Some(dir) = &state.config.static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }
    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind, spawn the hub and janitor, and start serving.
pub async fn start(config: ServerConfig) -> Result<ServerHandle, ServerError> {
    let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ServerError::InvalidAddr(format!("{}:{}", config.host, config.port)))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::bind(&addr, e))?;
    let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let token = CancellationToken::new();
    let (hub_tx, hub_task) = hub::spawn_hub(Relay::new(config.mode), DEFAULT_HUB_CAPACITY, token.clone());
    let janitor_task = janitor::spawn_janitor(hub_tx.clone(), config.sweep_interval, token.clone());

    info!(
        addr = %local_addr,
        protocol = %config.protocol,
        mode = %config.mode,
        ws_path = %config.ws_path,
        static_dir = ?config.static_dir,
        "parley relay listening"
    );

    let router = build_router(AppState {
        hub: hub_tx,
        config,
        shutdown: token.clone(),
    });
    let serve_token = token.clone();
    let serve_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(serve_token.cancelled_owned())
            .await
        {
            error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle {
        local_addr,
        token,
        tasks: vec![serve_task, hub_task, janitor_task],
    })
}

/// Running server. Dropping it leaves the tasks running.
pub struct ServerHandle {
    local_addr: SocketAddr,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that stops the server when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop accepting, close sockets, and wait for the background tasks.
    pub async fn shutdown(self) {
        self.token.cancel();
        info!(task_count = self.tasks.len(), "shutting down");
        let drain = futures::future::join_all(self.tasks);
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
            warn!("shutdown timed out after {SHUTDOWN_TIMEOUT:?}");
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let AppState { hub, config, shutdown } = state;
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| {
            session::run_session(
                socket,
                hub,
                config.max_send_queue,
                config.heartbeat_interval,
                shutdown,
            )
        })
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (reply, rx) = oneshot::channel();
    if state.hub.send(HubEvent::Stats(reply)).await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "hub stopped").into_response();
    }
    match rx.await {
        Ok(stats) => Json(HealthResponse {
            status: "ok",
            connections: stats.open,
            clients: stats.clients,
            paired: stats.paired,
            mode: state.config.mode,
        })
        .into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "hub stopped").into_response(),
    }
}
