//! Scaling Dispatcher.
//!
//! Validate, then issue exactly one "set replica count" to the
//! orchestrator. The dispatcher holds no topology state, so a failed
//! scale leaves nothing to roll back.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use fleetshim_core::config::ScalingConfig;
use fleetshim_core::{TelemetryEvent, node_tag, operation};
use fleetshim_orchestrator::{CountFile, Orchestrator, OrchestratorError, ScaleAck};
use fleetshim_telemetry::EventRecorder;

/// Endpoint recorded for scale events, whichever path triggered them.
pub const SCALE_ENDPOINT: &str = "/api/scale";

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("replica count {requested} outside {min}..={max}")]
    OutOfRange { requested: i64, min: u32, max: u32 },

    #[error("orchestrator rejected scale: {0}")]
    Orchestrator(#[from] OrchestratorError),
}

impl ScaleError {
    /// Detail text for the client: the orchestrator's own diagnostic when
    /// it failed, otherwise the validation message.
    pub fn details(&self) -> String {
        match self {
            ScaleError::Orchestrator(e) => e.diagnostic(),
            other => other.to_string(),
        }
    }
}

/// Inclusive replica-count policy bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaBounds {
    pub min: u32,
    pub max: u32,
}

impl ReplicaBounds {
    pub fn contains(&self, replicas: u32) -> bool {
        (self.min..=self.max).contains(&replicas)
    }
}

impl From<&ScalingConfig> for ReplicaBounds {
    fn from(config: &ScalingConfig) -> Self {
        Self {
            min: config.min_replicas,
            max: config.max_replicas,
        }
    }
}

pub struct ScaleDispatcher {
    orchestrator: Arc<dyn Orchestrator>,
    bounds: ReplicaBounds,
    publish: Option<CountFile>,
    recorder: Option<EventRecorder>,
}

impl ScaleDispatcher {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, bounds: ReplicaBounds) -> Self {
        Self {
            orchestrator,
            bounds,
            publish: None,
            recorder: None,
        }
    }

    /// Publish every acknowledged count to `file`.
    pub fn with_count_file(mut self, file: CountFile) -> Self {
        self.publish = Some(file);
        self
    }

    /// Record a SCALE event for every acknowledged scale.
    pub fn with_recorder(mut self, recorder: EventRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn bounds(&self) -> ReplicaBounds {
        self.bounds
    }

    /// Check a raw client-supplied count against the bounds.
    pub fn validate(&self, requested: i64) -> Result<u32, ScaleError> {
        u32::try_from(requested)
            .ok()
            .filter(|n| self.bounds.contains(*n))
            .ok_or(ScaleError::OutOfRange {
                requested,
                min: self.bounds.min,
                max: self.bounds.max,
            })
    }

    pub async fn scale(&self, requested: i64) -> Result<ScaleAck, ScaleError> {
        let replicas = self.validate(requested)?;
        info!(replicas, "scale requested");

        let ack = match self.orchestrator.set_replica_count(replicas).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!(replicas, error = %e, "scale failed");
                return Err(e.into());
            }
        };

        if let Some(file) = &self.publish
            && let Err(e) = file.publish(ack.replicas).await
        {
            warn!(error = %e, "could not publish replica count");
        }

        if let Some(recorder) = &self.recorder {
            recorder.record(TelemetryEvent::new(
                SCALE_ENDPOINT,
                operation::SCALE,
                node_tag::ORCHESTRATOR,
            ));
        }

        Ok(ack)
    }
}
