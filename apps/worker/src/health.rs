use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use dashprune_core::{AppError, AppResult};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Liveness payload served at `/health`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) namespaces: Vec<String>,
    pub(crate) dry_run: bool,
}

impl HealthResponse {
    pub(crate) fn ok(namespaces: Vec<String>, dry_run: bool) -> Self {
        Self {
            status: "ok",
            namespaces,
            dry_run,
        }
    }
}

pub(crate) fn health_router(response: HealthResponse) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(response))
}

async fn health_handler(State(response): State<Arc<HealthResponse>>) -> Json<HealthResponse> {
    Json(response.as_ref().clone())
}

/// Serves the health endpoint until `cancel` fires.
pub(crate) async fn serve_health(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> AppResult<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|error| AppError::Internal(format!("health server error: {error}")))
}
