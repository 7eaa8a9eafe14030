//! HTTP server for cache status and maintenance endpoints
//!
//! Provides /health and /maintenance (GET for the last run, POST to run now).

use crate::scheduler::CleanupScheduler;
use crate::types::{CleanupState, HealthResponse};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use media_cache::MediaCache;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: Arc<MediaCache>,
    pub scheduler: CleanupScheduler,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: Arc<MediaCache>, scheduler: CleanupScheduler) -> Self {
        Self {
            cache,
            scheduler,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/maintenance", get(last_maintenance).post(run_maintenance))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server, stopping when `shutdown` resolves
pub async fn start_server(
    state: SharedState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: state.cache.stats(),
    })
}

/// Status of the most recent cleanup run
async fn last_maintenance(State(state): State<SharedState>) -> Response {
    match state.scheduler.last_status().await {
        Some(status) => Json(status).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No cleanup has run yet".to_string(),
            }),
        )
            .into_response(),
    }
}

/// Run a cleanup immediately and report its outcome
async fn run_maintenance(State(state): State<SharedState>) -> Response {
    let status = state.scheduler.run_now().await;
    let code = match status.state {
        CleanupState::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    (code, Json(status)).into_response()
}
