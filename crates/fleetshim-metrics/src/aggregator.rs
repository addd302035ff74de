//! Metrics Aggregator.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use fleetshim_core::ClusterTopology;
use fleetshim_orchestrator::ReplicaCountSource;
use fleetshim_store::{Datastore, StoreResult};
use fleetshim_telemetry::TelemetryBuffer;

/// Trailing window used for the throughput figure.
pub const THROUGHPUT_WINDOW: Duration = Duration::from_secs(10);

/// Reads of the log counts before settling for a possibly moved total.
const COUNT_ATTEMPTS: u32 = 3;

/// Longest wait for an in-flight flush between attempts.
const SETTLE_WAIT: Duration = Duration::from_secs(2);

/// One reconciled view of the cluster. Rebuilt on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSnapshot {
    /// Primary plus live replicas. Never below 1.
    pub active_nodes: u32,
    /// Persisted request logs plus events not yet flushed.
    pub total_log_count: u64,
    /// Requests per second over [`THROUGHPUT_WINDOW`].
    pub current_throughput: f64,
    /// Events still held by the telemetry buffer.
    pub buffered_events: u64,
}

impl ClusterSnapshot {
    /// Throughput rounded to one decimal, `"0.0"` when undefined.
    pub fn throughput_display(&self) -> String {
        format_rate(self.current_throughput)
    }
}

/// Format a rate with one decimal. Non-finite values render as `"0.0"`.
pub fn format_rate(rate: f64) -> String {
    if !rate.is_finite() || rate <= 0.0 {
        return "0.0".to_string();
    }
    format!("{rate:.1}")
}

pub struct MetricsAggregator {
    primary: Arc<dyn Datastore>,
    buffer: TelemetryBuffer,
    replicas: Arc<dyn ReplicaCountSource>,
}

impl MetricsAggregator {
    pub fn new(
        primary: Arc<dyn Datastore>,
        buffer: TelemetryBuffer,
        replicas: Arc<dyn ReplicaCountSource>,
    ) -> Self {
        Self {
            primary,
            buffer,
            replicas,
        }
    }

    pub async fn snapshot(&self) -> ClusterSnapshot {
        let (replicas, counts) = tokio::join!(self.replicas.live_replica_count(), self.log_counts());
        let LogCounts {
            buffered,
            persisted,
            recent,
        } = counts;

        let topology = match replicas {
            Ok(count) => ClusterTopology::new(count),
            Err(e) => {
                warn!(error = %e, "replica count unavailable, reporting primary only");
                ClusterTopology::primary_only()
            }
        };

        let persisted = persisted.unwrap_or_else(|e| {
            warn!(error = %e, "log count unavailable");
            0
        });

        let recent = recent.unwrap_or_else(|e| {
            warn!(error = %e, "recent log count unavailable");
            0
        });

        ClusterSnapshot {
            active_nodes: topology.active_nodes(),
            total_log_count: persisted + buffered,
            current_throughput: recent as f64 / THROUGHPUT_WINDOW.as_secs_f64(),
            buffered_events: buffered,
        }
    }

    /// Buffered and persisted counts that no flush moved in between.
    ///
    /// A batch committed while the count query runs would otherwise be
    /// seen both in the buffer and in the table. The counts are kept only
    /// when no insert was in flight and the buffer epoch did not change
    /// across the queries; otherwise the in-flight flush is awaited and
    /// the counts are read again.
    async fn log_counts(&self) -> LogCounts {
        let mut attempt = 1;
        loop {
            let before = self.buffer.pending_count();
            let (persisted, recent) = tokio::join!(
                self.primary.count_logs(),
                self.primary.count_logs_since(THROUGHPUT_WINDOW),
            );
            let counts = LogCounts {
                buffered: before.events,
                persisted,
                recent,
            };

            let stable = before.settled && self.buffer.epoch() == before.epoch;
            if stable {
                return counts;
            }
            if attempt >= COUNT_ATTEMPTS {
                debug!(attempt, "telemetry flush overlapped every count, total may be off by one batch");
                return counts;
            }

            attempt += 1;
            if tokio::time::timeout(SETTLE_WAIT, self.buffer.settled())
                .await
                .is_err()
            {
                debug!("in-flight telemetry flush still running, recounting");
            }
        }
    }
}

struct LogCounts {
    buffered: u64,
    persisted: StoreResult<u64>,
    recent: StoreResult<u64>,
}
