//! REST API handlers.

use axum::Extension;
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use fleetshim_core::{ReadSource, SiteEntry, node_tag, operation};
use fleetshim_metrics::render_prometheus;
use fleetshim_orchestrator::ReplicaNode;
use fleetshim_router::NewEntry;

use crate::AppState;
use crate::error::ApiError;
use crate::telemetry::ServedBy;

pub const DEFAULT_LOG_LIMIT: u32 = 10;
pub const MAX_LOG_LIMIT: u32 = 50;

// ── Data path ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub source: ReadSource,
    pub data: Vec<SiteEntry>,
}

/// GET /api/data
pub async fn read_data(State(state): State<AppState>) -> Response {
    match state.reads.read_latest().await {
        Ok(outcome) => (
            Extension(ServedBy::new(outcome.source.node_tag(), operation::READ)),
            Json(ReadResponse {
                source: outcome.source,
                data: outcome.data,
            }),
        )
            .into_response(),
        Err(e) => (
            Extension(ServedBy::new(node_tag::UNAVAILABLE, operation::READ)),
            ApiError::from(e),
        )
            .into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WriteRequest {
    pub message: Option<String>,
}

/// POST /api/data
///
/// A request without a JSON body writes the default title. A body that
/// is present but malformed is rejected.
pub async fn write_data(
    State(state): State<AppState>,
    body: Result<Json<WriteRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => WriteRequest::default(),
        Err(rejection) => return ApiError::BadRequest(rejection.body_text()).into_response(),
    };

    let entry = NewEntry::from_message(request.message.as_deref());
    match state.writes.write_entry(&entry).await {
        Ok(()) => (
            StatusCode::CREATED,
            Extension(ServedBy::new(node_tag::PRIMARY, operation::WRITE)),
            Json(json!({ "status": "Written to Primary" })),
        )
            .into_response(),
        Err(e) => (
            Extension(ServedBy::new(node_tag::UNAVAILABLE, operation::WRITE)),
            ApiError::from(e),
        )
            .into_response(),
    }
}

// ── Scaling ────────────────────────────────────────────────────

/// Scale request body. `count` is accepted for older dashboards.
#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    #[serde(alias = "count")]
    pub replicas: i64,
}

/// POST /api/scale
pub async fn scale(
    State(state): State<AppState>,
    body: Result<Json<ScaleRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let ack = state.dispatcher.scale(request.replicas).await?;
    Ok(Json(json!({
        "status": "ok",
        "message": format!("Scaled to {} nodes", ack.replicas),
        "replicas": ack.replicas,
    }))
    .into_response())
}

// ── Observability ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Primary plus live replicas.
    pub active_replicas: u32,
    pub total_logs: u64,
    /// Requests per second, one decimal.
    pub current_tps: String,
}

/// GET /api/stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let snapshot = state.aggregator.snapshot().await;
    Json(StatsResponse {
        active_replicas: snapshot.active_nodes,
        total_logs: snapshot.total_log_count,
        current_tps: snapshot.throughput_display(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<u32>,
}

/// GET /api/logs
///
/// Newest first. Never an error status: a failed query lists nothing.
pub async fn logs(
    State(state): State<AppState>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Response {
    let limit = query
        .ok()
        .and_then(|Query(q)| q.limit)
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);

    match state.primary.recent_logs(limit).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            warn!(error = %e, "log listing failed");
            Json(Vec::<()>::new()).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReplicasResponse {
    pub active_nodes: u32,
    pub replicas: Vec<ReplicaNode>,
}

/// GET /api/replicas
pub async fn replicas(State(state): State<AppState>) -> Json<ReplicasResponse> {
    let replicas = match state.orchestrator.list_live_replicas().await {
        Ok(replicas) => replicas,
        Err(e) => {
            warn!(error = %e, "replica listing failed");
            Vec::new()
        }
    };
    let count = u32::try_from(replicas.len()).unwrap_or(u32::MAX);
    debug!(replicas = count, "listed live replicas");
    Json(ReplicasResponse {
        active_nodes: count.saturating_add(1),
        replicas,
    })
}

/// GET /health
pub async fn health() -> &'static str {
    "OK"
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.aggregator.snapshot().await;
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        render_prometheus(&snapshot),
    )
}
