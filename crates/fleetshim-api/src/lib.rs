//! fleetshim-api: HTTP surface for fleetshim.
//!
//! Every request that matches a route passes through the telemetry
//! middleware. Requests that match nothing are answered by the 404
//! fallback and never recorded. Control and observability routes are
//! excluded from telemetry so the monitoring surface does not measure
//! itself.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/data` | Latest entry, replica first with primary fallback |
//! | POST | `/api/data` | Write an entry to the primary |
//! | POST | `/api/scale` | Set the replica count |
//! | GET | `/api/stats` | Cluster snapshot |
//! | GET | `/api/logs` | Most recent request logs |
//! | GET | `/api/replicas` | Live replica listing with CPU |
//! | GET | `/health` | Liveness |
//! | GET | `/metrics` | Prometheus exposition |

pub mod error;
pub mod handlers;
pub mod telemetry;

use std::collections::HashSet;
use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use fleetshim_core::FleetConfig;
use fleetshim_metrics::MetricsAggregator;
use fleetshim_orchestrator::{CountFile, Orchestrator, ReplicaCountChain};
use fleetshim_router::{ReadRouter, WritePath};
use fleetshim_scale::{ReplicaBounds, ScaleDispatcher};
use fleetshim_store::{ClusterPools, Datastore};
use fleetshim_telemetry::{EventRecorder, TelemetryBuffer};

pub use error::ApiError;
pub use telemetry::ServedBy;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub reads: Arc<ReadRouter>,
    pub writes: Arc<WritePath>,
    pub dispatcher: Arc<ScaleDispatcher>,
    pub aggregator: Arc<MetricsAggregator>,
    pub orchestrator: Arc<dyn Orchestrator>,
    /// Where request logs are read back from.
    pub primary: Arc<dyn Datastore>,
    pub buffer: TelemetryBuffer,
    /// Direct event inserts made by the dispatcher. Shutdown waits on it.
    pub recorder: EventRecorder,
    pub excluded_paths: Arc<HashSet<String>>,
}

impl AppState {
    /// Wire every data-path component from configuration.
    pub fn assemble(
        pools: &ClusterPools,
        orchestrator: Arc<dyn Orchestrator>,
        buffer: TelemetryBuffer,
        config: &FleetConfig,
    ) -> Self {
        let primary = Arc::clone(pools.primary());

        let replica_count = Arc::new(ReplicaCountChain::from_config(
            &config.replica_source,
            Arc::clone(&orchestrator),
        ));

        let recorder = EventRecorder::new(Arc::clone(&primary));
        let mut dispatcher = ScaleDispatcher::new(
            Arc::clone(&orchestrator),
            ReplicaBounds::from(&config.scaling),
        )
        .with_recorder(recorder.clone());
        if let Some(path) = &config.replica_source.count_file {
            dispatcher = dispatcher.with_count_file(CountFile::new(path.clone()));
        }

        Self {
            reads: Arc::new(ReadRouter::new(pools, config.datastore.query_timeout())),
            writes: Arc::new(WritePath::new(pools)),
            dispatcher: Arc::new(dispatcher),
            aggregator: Arc::new(MetricsAggregator::new(
                Arc::clone(&primary),
                buffer.clone(),
                replica_count,
            )),
            orchestrator,
            primary,
            buffer,
            recorder,
            excluded_paths: Arc::new(config.telemetry.excluded_paths.iter().cloned().collect()),
        }
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.contains(path)
    }
}

/// Build the complete router: routes, telemetry, tracing, CORS.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/data", get(handlers::read_data).post(handlers::write_data))
        .route("/api/scale", post(handlers::scale))
        .route("/api/stats", get(handlers::stats))
        .route("/api/logs", get(handlers::logs))
        .route("/api/replicas", get(handlers::replicas))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            telemetry::record_request,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::testing::{FakeOrchestrator, harness};

    async fn call(router: Router, method: &str, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        router.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn data_requests_are_buffered() {
        let h = harness(FakeOrchestrator::default());
        let router = build_router(h.state.clone());

        assert_eq!(call(router.clone(), "GET", "/api/data").await, StatusCode::OK);
        assert_eq!(call(router, "POST", "/api/data").await, StatusCode::CREATED);
        assert_eq!(h.state.buffer.len(), 2);
    }

    #[tokio::test]
    async fn control_routes_are_not_buffered() {
        let h = harness(FakeOrchestrator::default());
        let router = build_router(h.state.clone());

        for uri in ["/api/stats", "/api/logs", "/api/replicas", "/health", "/metrics"] {
            assert_eq!(call(router.clone(), "GET", uri).await, StatusCode::OK, "{uri}");
        }
        assert!(h.state.buffer.is_empty());
    }

    #[tokio::test]
    async fn unmatched_paths_are_not_buffered() {
        let h = harness(FakeOrchestrator::default());
        let router = build_router(h.state.clone());

        for uri in ["/nope", "/favicon.ico", "/api/stats/", "/health/"] {
            assert_eq!(call(router.clone(), "GET", uri).await, StatusCode::NOT_FOUND, "{uri}");
        }
        assert!(h.state.buffer.is_empty());

        // Wrong method on a data route is not a served request either.
        assert_eq!(
            call(router, "DELETE", "/api/data").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert!(h.state.buffer.is_empty());
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let h = harness(FakeOrchestrator::default());
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/data")
            .header("origin", "http://dashboard.local")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = build_router(h.state.clone()).oneshot(request).await.unwrap();

        assert!(response.status().is_success());
        assert!(
            response
                .headers()
                .contains_key("access-control-allow-origin")
        );
        assert!(h.state.buffer.is_empty());
    }
}
