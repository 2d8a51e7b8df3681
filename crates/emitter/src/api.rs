//! HTTP API for time-series queries, pass triggering, and Prometheus
//! metrics

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use emitter_lib::{Emitter, EmitterMetrics, QueryResponder};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub emitter: Arc<Emitter>,
    pub responder: QueryResponder,
    pub metrics: EmitterMetrics,
}

impl AppState {
    pub fn new(emitter: Arc<Emitter>, responder: QueryResponder, metrics: EmitterMetrics) -> Self {
        Self {
            emitter,
            responder,
            metrics,
        }
    }
}

/// Time-series query endpoint
///
/// Accepts GET and POST; parameters travel in the query string either
/// way. Every hit counts toward the lifetime query counter, malformed
/// ones included.
async fn query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.metrics.inc_query_requests();

    let expression = match params.get("query") {
        Some(q) => q,
        None => return bad_request("missing required parameter: query"),
    };
    let (from, to) = match (unix_seconds(&params, "from"), unix_seconds(&params, "to")) {
        (Some(from), Some(to)) => (from, to),
        _ => return bad_request("from and to must be integer unix seconds"),
    };

    match state.responder.respond(expression, from, to).await {
        Ok(series) => (StatusCode::OK, Json(series)).into_response(),
        Err(e) => bad_request(&e.to_string()),
    }
}

fn unix_seconds(params: &HashMap<String, String>, key: &str) -> Option<i64> {
    params.get(key)?.parse().ok()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

/// Trigger endpoint: runs one generation pass and reports the keys the
/// validator skipped
async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    match state.emitter.run_pass().await {
        Ok(summary) => {
            let body = format!("Skipped keys: {}", summary.skipped_keys_text());
            (StatusCode::OK, body).into_response()
        }
        Err(e) => {
            error!(error = %e, "Triggered pass failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Pass failed: {:#}", e),
            )
                .into_response()
        }
    }
}

/// Readiness check; the server answers as soon as it is up
async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "ready": true })))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/query", get(query).post(query))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
