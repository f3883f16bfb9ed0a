use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;

use anontalk_graph::{MemoryGraph, PeerTracker};
use anontalk_shared::constants::GRAPH_ENDPOINT_PATH;

use crate::relay::handle_socket;

#[derive(Clone)]
pub struct AppState {
    pub graph: MemoryGraph,
    pub peers: Arc<Mutex<PeerTracker>>,
}

impl AppState {
    pub fn new(graph: MemoryGraph) -> Self {
        Self {
            graph,
            peers: Arc::new(Mutex::new(PeerTracker::new())),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(GRAPH_ENDPOINT_PATH, get(graph_socket))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    peers: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        peers: state.peers.lock().await.len(),
    })
}

async fn graph_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(address): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Some(address)))
}

/// Serve the relay on an already bound listener.
pub async fn serve_on(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    info!(addr = %listener.local_addr()?, "Relay listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, state).await
}
