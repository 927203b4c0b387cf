//! WebSocket server handler using Axum.

use crate::connection::{Connection, WsSink};
use crate::registry::ConnectionRegistry;
use crate::session::ClientSession;
use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use metrics::{counter, gauge};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application state.
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    active: AtomicUsize,
}

impl AppState {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            active: AtomicUsize::new(0),
        }
    }

    /// Number of open client sessions.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Count a session as open until the returned guard drops.
    fn track_session(self: &Arc<Self>) -> ActiveSession {
        let active = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        counter!("relay_connections_total").increment(1);
        gauge!("relay_active_connections").set(active as f64);
        ActiveSession {
            state: self.clone(),
        }
    }
}

/// Keeps the active-session count honest on every exit path, unwind included.
struct ActiveSession {
    state: Arc<AppState>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        let active = self.state.active.fetch_sub(1, Ordering::Relaxed) - 1;
        counter!("relay_disconnections_total").increment(1);
        gauge!("relay_active_connections").set(active as f64);
    }
}

/// Create the HTTP router: WebSocket upgrade on `/`, liveness on `/health`.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (ws_tx, ws_rx) = socket.split();
    let conn = Connection::new(WsSink::new(ws_tx));
    let conn_id = conn.id;

    let tracked = state.track_session();
    info!("Client {} connected", conn_id);

    let session = ClientSession::new(conn.clone(), state.registry.clone());
    session.run(ws_rx).await;

    drop(tracked);
    info!("Client {} disconnected after {}ms", conn_id, conn.age_ms());
}
