//! fleetshim-scale: replica scaling.
//!
//! [`ScaleDispatcher`] validates a requested replica count against the
//! configured bounds and forwards valid requests to the orchestrator.
//! Invalid requests never reach the orchestrator.
//!
//! [`Autoscaler`] is the optional background loop that steps the replica
//! count by one based on average replica CPU.
//!
//! # Step Algorithm
//!
//! ```text
//! avg = mean(cpu_percent of live replicas), 0 when none report
//!
//! if current < min:                          ScaleTo(min)
//! if avg > cpu_up_threshold   and current < max: ScaleTo(current + 1)
//! if avg < cpu_down_threshold and current > min: ScaleTo(current - 1)
//! otherwise NoChange
//! ```

pub mod autoscaler;
pub mod dispatcher;

pub use autoscaler::{Autoscaler, ScaleDecision, average_cpu};
pub use dispatcher::{ReplicaBounds, ScaleDispatcher, ScaleError};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use fleetshim_orchestrator::{
        Orchestrator, OrchestratorError, OrchestratorResult, ReplicaNode, ScaleAck,
    };

    /// Records every scale call and serves a fixed replica listing.
    #[derive(Default)]
    pub struct RecordingOrchestrator {
        pub calls: Mutex<Vec<u32>>,
        pub replicas: Mutex<Vec<ReplicaNode>>,
        pub fail_with: Option<String>,
    }

    impl RecordingOrchestrator {
        pub fn with_cpu(cpu: &[f64]) -> Self {
            let replicas = cpu
                .iter()
                .enumerate()
                .map(|(i, pct)| ReplicaNode {
                    name: format!("replica-db-{}", i + 1),
                    cpu_percent: Some(*pct),
                })
                .collect();
            Self {
                replicas: Mutex::new(replicas),
                ..Self::default()
            }
        }

        pub fn failing(stderr: &str) -> Self {
            Self {
                fail_with: Some(stderr.to_string()),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<u32> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Orchestrator for RecordingOrchestrator {
        async fn set_replica_count(&self, replicas: u32) -> OrchestratorResult<ScaleAck> {
            self.calls.lock().unwrap().push(replicas);
            match &self.fail_with {
                Some(stderr) => Err(OrchestratorError::CommandFailed {
                    command: "docker compose up".to_string(),
                    status: 1,
                    stderr: stderr.clone(),
                }),
                None => Ok(ScaleAck {
                    replicas,
                    output: format!("replica-db={replicas}"),
                }),
            }
        }

        async fn list_live_replicas(&self) -> OrchestratorResult<Vec<ReplicaNode>> {
            Ok(self.replicas.lock().unwrap().clone())
        }
    }
}
