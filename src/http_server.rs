//! HTTP server implementation using Axum.
//!
//! Thin serving surface over the worker: external callers only get the two
//! public interfaces, the execute operation and the metrics snapshot. The
//! workspace internals stay private and transient.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::{self, ExecutionRequest, ExecutionResult};
use crate::metrics::{self, MetricsSnapshot};
use crate::state::AppState;

/// Run the HTTP server on the given port with the provided state.
pub async fn run_server(port: u16, state: AppState) {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/execute", post(execute_submission))
        .route("/metrics", get(read_metrics))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn execute_submission(
    State(state): State<AppState>,
    Json(request): Json<ExecutionRequest>,
) -> Result<Json<ExecutionResult>, (StatusCode, String)> {
    if request.timeout_seconds == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "timeout_seconds must be positive".to_string(),
        ));
    }

    info!(
        timeout_seconds = request.timeout_seconds,
        "POST /execute - running submission"
    );

    let engine_config = state.engine.clone();
    let store = state.metrics.clone();
    let result = tokio::task::spawn_blocking(move || {
        let result = engine::execute(&engine_config, &request);
        metrics::record(store.as_ref(), &result);
        result
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(status = ?result.status, "POST /execute - done");
    Ok(Json(result))
}

async fn read_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    let store = state.metrics.clone();
    let snapshot = tokio::task::spawn_blocking(move || store.load())
        .await
        .unwrap_or_default();
    Json(snapshot)
}
