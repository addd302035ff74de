//! Periodic telemetry flush loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use fleetshim_store::Datastore;

use crate::buffer::{FlushOutcome, TelemetryBuffer};

/// Flushes the telemetry buffer into the primary on a fixed interval.
pub struct TelemetryFlusher {
    buffer: TelemetryBuffer,
    store: Arc<dyn Datastore>,
    interval: Duration,
}

impl TelemetryFlusher {
    pub fn new(buffer: TelemetryBuffer, store: Arc<dyn Datastore>, interval: Duration) -> Self {
        Self {
            buffer,
            store,
            interval,
        }
    }

    /// Run one flush cycle.
    pub async fn tick(&self) -> FlushOutcome {
        self.buffer.flush(self.store.as_ref()).await
    }

    /// Run the flush loop until the shutdown signal flips.
    ///
    /// The final drain belongs to the shutdown coordinator; this loop only
    /// finishes the cycle it is in and returns.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "telemetry flusher started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let FlushOutcome::Persisted(count) = self.tick().await {
                        debug!(count, "periodic flush complete");
                    }
                }
                _ = shutdown.changed() => {
                    info!("telemetry flusher stopping");
                    break;
                }
            }
        }
    }
}
