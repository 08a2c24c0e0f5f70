// Stats server
// HTTP surface for trackers (websocket), the leaderboard, the report and admin reset

pub mod websocket;

use crate::admin::Caller;
use crate::config::catalog::VehicleCatalog;
use crate::error::StatsError;
use crate::hub::{HubHandle, ParticipantId};
use crate::protocol::StatsSnapshot;
use crate::report;
use axum::{
    extract::State,
    http::HeaderMap,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;
use tracing::info;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// Shared by every request handler
pub struct ServerState {
    pub hub: HubHandle,
    pub catalog: Arc<VehicleCatalog>,

    /// Open tracker connections
    pub connections: DashMap<ParticipantId, ConnectionInfo>,

    /// Leaderboard size for chat-style output
    pub top_n: usize,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connected_at: Instant,
}

impl ConnectionInfo {
    pub fn new() -> Self {
        Self { connected_at: Instant::now() }
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    pub fn new(hub: HubHandle, catalog: Arc<VehicleCatalog>, top_n: usize) -> Self {
        Self {
            hub,
            catalog,
            connections: DashMap::new(),
            top_n,
        }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ws", get(websocket::handler))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/leaderboard", get(leaderboard))
        .route("/report", get(report_page))
        .route("/admin/reset", post(reset))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: Arc<ServerState>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("Stats server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Stats server stopped");
    Ok(())
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.connections.len(),
        "vehicles": state.catalog.len(),
    }))
}

async fn stats(State(state): State<Arc<ServerState>>) -> Result<Json<StatsSnapshot>, StatsError> {
    Ok(Json(state.hub.snapshot().await?))
}

async fn leaderboard(State(state): State<Arc<ServerState>>) -> Result<Json<Vec<String>>, StatsError> {
    let entries = state.hub.leaderboard().await?;
    Ok(Json(report::render_chat(&entries, state.top_n)))
}

async fn report_page(State(state): State<Arc<ServerState>>) -> Result<Html<String>, StatsError> {
    let entries = state.hub.leaderboard().await?;
    Ok(Html(report::render_html(&entries, chrono::Utc::now())))
}

async fn reset(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatsError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let caller = Caller::Player {
        id: header(PLAYER_ID_HEADER).unwrap_or_else(|| "http".to_string()),
        token: header(ADMIN_TOKEN_HEADER),
    };

    state.hub.reset(caller).await?;
    Ok(Json(serde_json::json!({ "status": "Vehicle statistics have been reset" })))
}
