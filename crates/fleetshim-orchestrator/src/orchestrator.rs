//! The orchestrator capability.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::OrchestratorResult;

/// A running replica node as reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicaNode {
    pub name: String,
    /// Recent CPU usage in percent, if the orchestrator reported one.
    pub cpu_percent: Option<f64>,
}

/// Synchronous acknowledgment of a scale command.
///
/// Proof the orchestrator accepted the request, not that the replicas
/// are ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleAck {
    pub replicas: u32,
    /// Whatever the orchestrator printed on success.
    pub output: String,
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Idempotently set the replica count to `replicas`.
    async fn set_replica_count(&self, replicas: u32) -> OrchestratorResult<ScaleAck>;

    /// Replicas the orchestrator currently reports as running.
    async fn list_live_replicas(&self) -> OrchestratorResult<Vec<ReplicaNode>>;
}
