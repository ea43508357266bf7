// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! HTTP API and static dashboard.
//!
//! POST /api/refresh        - start a background refresh
//! GET  /api/refresh/status - poll refresh progress
//! GET  /api/data/inventory - datacenter hierarchy
//! GET  /api/data/metrics   - customer metrics snapshot
//! GET  /api/capacity       - filtered available capacity with summary
//! GET  /api/health         - liveness

use crate::error::{CapacityError, Document};
use crate::query::CapacityFilter;
use crate::refresh::RefreshJob;
use crate::service::DataService;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

const INDEX_PAGE: &str = "capacity.html";

pub struct AppState {
    pub service: DataService,
    pub static_dir: PathBuf,
}

pub fn router(service: DataService, static_dir: impl Into<PathBuf>) -> Router {
    let static_dir = static_dir.into();
    let state = Arc::new(AppState {
        service,
        static_dir: static_dir.clone(),
    });

    Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/api/refresh", post(trigger_refresh_handler))
        .route("/api/refresh/status", get(refresh_status_handler))
        .route("/api/data/inventory", get(inventory_handler))
        .route("/api/data/metrics", get(metrics_handler))
        .route("/api/capacity", get(capacity_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until SIGTERM or Ctrl-C.
pub async fn run_server(app: Router, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Serving GPU capacity dashboard");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Maps library errors onto status codes and JSON bodies.
pub struct ApiError(CapacityError);

impl From<CapacityError> for ApiError {
    fn from(e: CapacityError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            CapacityError::NotFound(document) => {
                let message = match document {
                    Document::Inventory => "Inventory data not found",
                    Document::Metrics => "Metrics data not found",
                    Document::RawInventory => "Raw inventory data not found",
                };
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            CapacityError::AlreadyInProgress => (
                StatusCode::CONFLICT,
                Json(json!({
                    "status": "in_progress",
                    "message": "Refresh already in progress",
                })),
            )
                .into_response(),
            other => {
                warn!(error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": other.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let path = state.static_dir.join(INDEX_PAGE);
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Dashboard page unavailable");
            (StatusCode::NOT_FOUND, "Dashboard page not found").into_response()
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn trigger_refresh_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.service.trigger_refresh()?;
    Ok(Json(json!({
        "status": "started",
        "message": "Data refresh started",
    })))
}

#[derive(Serialize)]
struct RefreshStatusResponse {
    #[serde(flatten)]
    job: RefreshJob,
    in_progress: bool,
}

async fn refresh_status_handler(State(state): State<Arc<AppState>>) -> Json<RefreshStatusResponse> {
    let job = state.service.refresh_status();
    Json(RefreshStatusResponse {
        in_progress: job.status.is_running(),
        job,
    })
}

async fn inventory_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let tree = state.service.inventory()?;
    Ok(Json(tree.as_ref()).into_response())
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let metrics = state.service.metrics()?;
    Ok(Json(metrics.as_ref()).into_response())
}

async fn capacity_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CapacityFilter>,
) -> Result<Response, ApiError> {
    let report = state.service.capacity(&filter)?;
    Ok(Json(report).into_response())
}
