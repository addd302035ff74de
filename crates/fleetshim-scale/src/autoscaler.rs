//! Autoscaler: CPU-driven replica scaling, one step at a time.
//!
//! Reads replica CPU from the orchestrator's live listing, compares the
//! average against the configured thresholds, and dispatches a new
//! count through the [`ScaleDispatcher`] so the normal bounds apply.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use fleetshim_core::config::AutoscaleConfig;
use fleetshim_orchestrator::{Orchestrator, ReplicaNode};

use crate::dispatcher::ScaleDispatcher;

/// A scaling decision for the replica service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Scale to the specified replica count.
    ScaleTo(u32),
    /// No change needed.
    NoChange,
}

/// Mean CPU percent across replicas that reported one. 0 when none did.
pub fn average_cpu(replicas: &[ReplicaNode]) -> f64 {
    let readings: Vec<f64> = replicas.iter().filter_map(|r| r.cpu_percent).collect();
    if readings.is_empty() {
        return 0.0;
    }
    readings.iter().sum::<f64>() / readings.len() as f64
}

pub struct Autoscaler {
    orchestrator: Arc<dyn Orchestrator>,
    dispatcher: Arc<ScaleDispatcher>,
    config: AutoscaleConfig,
}

impl Autoscaler {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        dispatcher: Arc<ScaleDispatcher>,
        config: AutoscaleConfig,
    ) -> Self {
        Self {
            orchestrator,
            dispatcher,
            config,
        }
    }

    /// Decide the next replica count from the average CPU and the
    /// current count.
    pub fn evaluate(&self, avg_cpu: f64, current: u32) -> ScaleDecision {
        let bounds = self.dispatcher.bounds();

        if current < bounds.min {
            debug!(current, min = bounds.min, "below minimum, restoring");
            return ScaleDecision::ScaleTo(bounds.min);
        }

        if avg_cpu > self.config.cpu_up_threshold && current < bounds.max {
            debug!(avg_cpu, from = current, to = current + 1, "scaling up");
            return ScaleDecision::ScaleTo(current + 1);
        }

        if avg_cpu < self.config.cpu_down_threshold && current > bounds.min {
            debug!(avg_cpu, from = current, to = current - 1, "scaling down");
            return ScaleDecision::ScaleTo(current - 1);
        }

        ScaleDecision::NoChange
    }

    /// Read the live listing, decide, and dispatch.
    pub async fn evaluate_once(&self) -> anyhow::Result<ScaleDecision> {
        let replicas = self.orchestrator.list_live_replicas().await?;
        let current = u32::try_from(replicas.len())?;
        let avg_cpu = average_cpu(&replicas);
        debug!(avg_cpu, replicas = current, "autoscaler sample");

        let decision = self.evaluate(avg_cpu, current);
        if let ScaleDecision::ScaleTo(target) = decision {
            self.dispatcher.scale(i64::from(target)).await?;
            info!(from = current, to = target, avg_cpu, "autoscaler scaled replicas");
        }
        Ok(decision)
    }

    /// Run the autoscaler loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.interval();
        info!(
            interval_ms = interval.as_millis() as u64,
            up = self.config.cpu_up_threshold,
            down = self.config.cpu_down_threshold,
            "autoscaler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.evaluate_once().await {
                        error!(error = %e, "autoscaler evaluation failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}
