use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::orchestrator::{ArchitectOrchestrator, DesignMode};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<ArchitectOrchestrator>,
}

#[derive(Deserialize)]
struct DesignRequest {
    prompt: String,
    #[serde(default)]
    mode: DesignMode,
}

#[derive(Serialize)]
struct DesignResponse {
    flow_json: serde_json::Value,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

pub fn router(orchestrator: Arc<ArchitectOrchestrator>) -> Router {
    Router::new()
        .route("/design", post(design_handler))
        .route("/api/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(AppState { orchestrator })
}

pub async fn serve(orchestrator: Arc<ArchitectOrchestrator>, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    println!("✅ Server running at {}", addr.bright_green());
    println!("🚀 API: http://localhost:{}/design", port);

    axum::serve(listener, router(orchestrator)).await?;
    Ok(())
}

async fn design_handler(
    State(state): State<AppState>,
    Json(request): Json<DesignRequest>,
) -> Result<Json<DesignResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("Design request ({:?}): {}", request.mode, request.prompt);

    match state.orchestrator.design(&request.prompt, request.mode).await {
        Ok(graph) => Ok(Json(DesignResponse {
            flow_json: graph.to_value(),
        })),
        Err(e) => {
            error!("Design request failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    detail: "Design process error".to_string(),
                }),
            ))
        }
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
