//! End-to-end tests: full router, in-memory datastore, fake orchestrator.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tokio::sync::watch;
use tower::ServiceExt;

use fleetshim_api::{AppState, build_router};
use fleetshim_core::FleetConfig;
use fleetshim_orchestrator::{
    Orchestrator, OrchestratorError, OrchestratorResult, ReplicaNode, ScaleAck,
};
use fleetshim_store::{ClusterPools, Datastore, MemoryStore};
use fleetshim_telemetry::{
    ShutdownCoordinator, ShutdownPhase, TelemetryBuffer, TelemetryFlusher,
};

// ── Fixtures ──────────────────────────────────────────────────

#[derive(Default)]
struct FakeOrchestrator {
    replicas: Mutex<u32>,
    scale_calls: Mutex<Vec<u32>>,
    down: bool,
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn set_replica_count(&self, replicas: u32) -> OrchestratorResult<ScaleAck> {
        self.scale_calls.lock().unwrap().push(replicas);
        if self.down {
            return Err(OrchestratorError::CommandFailed {
                command: "docker compose up".to_string(),
                status: 1,
                stderr: "Cannot connect to the Docker daemon".to_string(),
            });
        }
        *self.replicas.lock().unwrap() = replicas;
        Ok(ScaleAck {
            replicas,
            output: String::new(),
        })
    }

    async fn list_live_replicas(&self) -> OrchestratorResult<Vec<ReplicaNode>> {
        if self.down {
            return Err(OrchestratorError::NoSource);
        }
        let n = *self.replicas.lock().unwrap();
        Ok((1..=n)
            .map(|i| ReplicaNode {
                name: format!("replica-db-{i}"),
                cpu_percent: Some(1.0),
            })
            .collect())
    }
}

struct Cluster {
    router: Router,
    state: AppState,
    primary: MemoryStore,
    replica: MemoryStore,
    orchestrator: Arc<FakeOrchestrator>,
}

fn cluster_with(orchestrator: FakeOrchestrator) -> Cluster {
    let primary = MemoryStore::new();
    let replica = MemoryStore::new();
    let pools = ClusterPools::new(Arc::new(primary.clone()), Arc::new(replica.clone()));
    let orchestrator = Arc::new(orchestrator);
    let state = AppState::assemble(
        &pools,
        orchestrator.clone(),
        TelemetryBuffer::new(),
        &FleetConfig::default(),
    );
    Cluster {
        router: build_router(state.clone()),
        state,
        primary,
        replica,
        orchestrator,
    }
}

fn cluster() -> Cluster {
    cluster_with(FakeOrchestrator::default())
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

// ── Telemetry ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn buffered_events_appear_in_logs_after_one_flush_interval() {
    let c = cluster();
    let flusher = TelemetryFlusher::new(
        c.state.buffer.clone(),
        Arc::new(c.primary.clone()),
        Duration::from_secs(5),
    );
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { flusher.run(rx).await });

    for _ in 0..3 {
        let (status, _) = send(&c.router, "GET", "/api/data", None).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(c.state.buffer.len(), 3);

    // Not persisted yet, but already counted.
    let (_, logs) = send(&c.router, "GET", "/api/logs", None).await;
    assert!(logs.as_array().unwrap().is_empty());
    let (_, stats) = send(&c.router, "GET", "/api/stats", None).await;
    assert_eq!(stats["total_logs"], 3);

    tokio::time::sleep(Duration::from_millis(5_100)).await;

    assert_eq!(c.state.buffer.len(), 0);
    let (_, logs) = send(&c.router, "GET", "/api/logs", None).await;
    let rows = logs.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    for row in rows {
        assert_eq!(row["endpoint"], "/api/data");
        assert_eq!(row["method"], "READ");
        assert_eq!(row["node_used"], "replica");
        assert!(row["timestamp"].as_str().unwrap().ends_with('Z'));
    }
    let (_, stats) = send(&c.router, "GET", "/api/stats", None).await;
    assert_eq!(stats["total_logs"], 3);

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn shutdown_persists_buffered_events_before_terminating() {
    let c = cluster();
    send(&c.router, "POST", "/api/data", Some(r#"{"message":"a"}"#)).await;
    send(&c.router, "POST", "/api/data", Some(r#"{"message":"b"}"#)).await;
    assert_eq!(c.state.buffer.len(), 2);

    let coordinator =
        ShutdownCoordinator::new(c.state.buffer.clone(), Arc::new(c.primary.clone()));
    coordinator.drain().await;

    assert_eq!(coordinator.phase(), ShutdownPhase::Terminated);
    let logs = c.primary.logs();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l.method == "WRITE" && l.node_used == "primary"));
}

#[tokio::test]
async fn shutdown_waits_for_scale_event_insert() {
    let c = cluster();
    let (status, _) = send(&c.router, "POST", "/api/scale", Some(r#"{"replicas":2}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let coordinator = ShutdownCoordinator::new(c.state.buffer.clone(), Arc::new(c.primary.clone()))
        .with_recorder(c.state.recorder.clone());
    coordinator.drain().await;

    let logs = c.primary.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].endpoint, "/api/scale");
    assert_eq!(logs[0].method, "SCALE");
}

// ── Data path ─────────────────────────────────────────────────

#[tokio::test]
async fn unreachable_replica_falls_back_to_primary() {
    let c = cluster();
    c.primary.insert_entry("older", "d").await.unwrap();
    c.primary.insert_entry("latest", "d").await.unwrap();
    c.replica.set_available(false);

    let (status, body) = send(&c.router, "GET", "/api/data", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "PRIMARY_FALLBACK");
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["title"], "latest");

    c.state.buffer.flush(&c.primary).await;
    assert_eq!(c.primary.logs()[0].node_used, "primary-fallback");
}

#[tokio::test]
async fn writes_land_on_primary_only() {
    let c = cluster();
    let (status, body) = send(&c.router, "POST", "/api/data", Some(r#"{"message":"hi"}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "Written to Primary");
    assert_eq!(c.primary.entries().len(), 1);
    assert!(c.replica.entries().is_empty());
}

#[tokio::test]
async fn total_outage_is_503_and_health_still_answers() {
    let c = cluster();
    c.primary.set_available(false);
    c.replica.set_available(false);

    let (status, body) = send(&c.router, "GET", "/api/data", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());

    let response = c
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ── Scaling ───────────────────────────────────────────────────

#[tokio::test]
async fn scale_then_stats_reflect_new_topology() {
    let c = cluster();
    let (status, body) = send(&c.router, "POST", "/api/scale", Some(r#"{"replicas":3}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Scaled to 3 nodes");

    let (_, stats) = send(&c.router, "GET", "/api/stats", None).await;
    assert_eq!(stats["active_replicas"], 4);

    let (_, replicas) = send(&c.router, "GET", "/api/replicas", None).await;
    assert_eq!(replicas["active_nodes"], 4);
    assert_eq!(replicas["replicas"].as_array().unwrap().len(), 3);

    // Scale is not request telemetry.
    assert!(c.state.buffer.is_empty());
}

#[tokio::test]
async fn invalid_scale_never_reaches_orchestrator() {
    let c = cluster();
    for body in [r#"{"replicas":0}"#, r#"{"replicas":11}"#, r#"{"replicas":"x"}"#] {
        let (status, json) = send(&c.router, "POST", "/api/scale", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(json["error"].is_string());
    }
    assert!(c.orchestrator.scale_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn orchestrator_outage_fails_scale_and_degrades_stats() {
    let c = cluster_with(FakeOrchestrator {
        down: true,
        ..FakeOrchestrator::default()
    });

    let (status, body) = send(&c.router, "POST", "/api/scale", Some(r#"{"replicas":2}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["details"], "Cannot connect to the Docker daemon");

    let (status, stats) = send(&c.router, "GET", "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["active_replicas"], 1);
    assert_eq!(stats["current_tps"], "0.0");
}

// ── Metrics ───────────────────────────────────────────────────

#[tokio::test]
async fn throughput_counts_recent_persisted_events() {
    let c = cluster();
    for _ in 0..5 {
        send(&c.router, "GET", "/api/data", None).await;
    }
    c.state.buffer.flush(&c.primary).await;

    let (_, stats) = send(&c.router, "GET", "/api/stats", None).await;
    assert_eq!(stats["total_logs"], 5);
    assert_eq!(stats["current_tps"], "0.5");
}

#[tokio::test]
async fn prometheus_exposes_snapshot() {
    let c = cluster();
    send(&c.router, "GET", "/api/data", None).await;

    let response = c
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("fleetshim_active_nodes 1\n"));
    assert!(text.contains("fleetshim_total_logs 1\n"));
    assert!(text.contains("fleetshim_buffered_events 1\n"));
}
