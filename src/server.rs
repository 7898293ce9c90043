//! HTTP adapter: one route that runs the pipeline, one that serves its output.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::pipeline::Pipeline;
use crate::storage::OutputStore;
use crate::{HandbookError, Result};

pub const PRINT_ROUTE: &str = "/print/handbook";
pub const OUTPUT_ROUTE: &str = "/output";

/// Marker a target URL must carry to be accepted.
pub const PRINT_MARKER: &str = "print=true";

const INVALID_TARGET: &str = "Invalid target URL.";
const GENERATION_FAILED: &str = "PDF generation failed.";

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

#[derive(Debug, Deserialize)]
struct PrintQuery {
    #[serde(rename = "targetUrl")]
    target_url: Option<String>,
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route(PRINT_ROUTE, get(print_handbook))
        .route(&format!("{OUTPUT_ROUTE}/:filename"), get(output_file))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pipeline })
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(pipeline: Arc<Pipeline>, addr: SocketAddr) -> Result<()> {
    tokio::fs::create_dir_all(pipeline.store().root())
        .await
        .map_err(|err| {
            HandbookError::persist(format!(
                "cannot create output directory {}: {err}",
                pipeline.store().root().display()
            ))
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| HandbookError::Config(format!("cannot bind {addr}: {err}")))?;
    info!(%addr, output = %pipeline.store().root().display(), "listening");

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| HandbookError::Internal(format!("server stopped: {err}")))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for shutdown signal");
        futures::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn is_acceptable_target(target: Option<&str>) -> Option<&str> {
    target
        .map(str::trim)
        .filter(|url| !url.is_empty() && url.contains(PRINT_MARKER))
}

async fn print_handbook(State(state): State<AppState>, Query(query): Query<PrintQuery>) -> Response {
    let Some(target) = is_acceptable_target(query.target_url.as_deref()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": INVALID_TARGET }))).into_response();
    };

    match state.pipeline.generate(target).await {
        Ok(artifact) => Json(json!({
            "url": format!("{OUTPUT_ROUTE}/{}", artifact.filename)
        }))
        .into_response(),
        Err(err) => {
            error!(kind = %err.kind(), error = %err, url = target, "handbook generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": GENERATION_FAILED })),
            )
                .into_response()
        }
    }
}

/// Only names the store hands out are reachable; diagnostics stay private.
async fn output_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    request: Request,
) -> Response {
    if !OutputStore::is_artifact_name(&filename) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let path = state.pipeline.store().root().join(&filename);
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}
