//! `fleetshimd serve`: assemble subsystems, serve, drain.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use fleetshim_api::{AppState, build_router};
use fleetshim_core::FleetConfig;
use fleetshim_orchestrator::{ComposeOrchestrator, Orchestrator};
use fleetshim_scale::Autoscaler;
use fleetshim_store::ClusterPools;
use fleetshim_telemetry::{ShutdownCoordinator, TelemetryBuffer, TelemetryFlusher};

use crate::signal;

pub async fn run(config: FleetConfig) -> anyhow::Result<()> {
    info!("fleetshim daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let pools = ClusterPools::from_config(&config.datastore);
    if let Err(e) = pools.primary().ensure_schema().await {
        warn!(error = %e, "schema bootstrap failed, continuing");
    }

    let buffer = TelemetryBuffer::new();
    let orchestrator: Arc<dyn Orchestrator> =
        Arc::new(ComposeOrchestrator::new(config.orchestrator.clone()));
    info!(
        project = %config.orchestrator.project,
        service = %config.orchestrator.service,
        "orchestrator initialized"
    );

    let state = AppState::assemble(&pools, Arc::clone(&orchestrator), buffer.clone(), &config);
    let coordinator = Arc::new(
        ShutdownCoordinator::new(buffer.clone(), Arc::clone(pools.primary()))
            .with_recorder(state.recorder.clone()),
    );

    // ── Start background tasks ─────────────────────────────────

    let flusher = TelemetryFlusher::new(
        buffer,
        Arc::clone(pools.primary()),
        config.telemetry.flush_interval(),
    );
    let flush_shutdown = coordinator.subscribe();
    let flush_handle = tokio::spawn(async move {
        flusher.run(flush_shutdown).await;
    });

    let autoscale_handle = if config.autoscale.enabled {
        let autoscaler = Autoscaler::new(
            orchestrator,
            Arc::clone(&state.dispatcher),
            config.autoscale.clone(),
        );
        let autoscale_shutdown = coordinator.subscribe();
        Some(tokio::spawn(async move {
            autoscaler.run(autoscale_shutdown).await;
        }))
    } else {
        info!("autoscaler disabled");
        None
    };

    // ── Start API server ───────────────────────────────────────

    let router = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    let drain = Arc::clone(&coordinator);
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal::terminate().await;
            drain.begin_drain();
        })
        .await;

    // ── Drain ──────────────────────────────────────────────────

    // A server error skips the signal path; start the drain here instead.
    coordinator.begin_drain();

    let _ = flush_handle.await;
    if let Some(handle) = autoscale_handle {
        let _ = handle.await;
    }

    coordinator.finish_drain().await;

    served?;
    info!("fleetshim daemon stopped");
    Ok(())
}
