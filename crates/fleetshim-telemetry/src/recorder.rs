//! Best-effort single-event recording.
//!
//! Used for events that bypass the buffer (e.g. scale outcomes on an
//! endpoint excluded from request telemetry). The insert runs on its own
//! task; its failure is logged and never reaches the caller. Outstanding
//! inserts are tracked so shutdown can wait for them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinSet;
use tracing::{debug, warn};

use fleetshim_core::TelemetryEvent;
use fleetshim_store::Datastore;

/// Clones share the same set of outstanding inserts.
#[derive(Clone)]
pub struct EventRecorder {
    store: Arc<dyn Datastore>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl EventRecorder {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self {
            store,
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Spawn the insert and return immediately.
    pub fn record(&self, event: TelemetryEvent) {
        let store = Arc::clone(&self.store);
        let mut tasks = self.tasks();
        // Reap finished inserts so the set only holds live ones.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            match store.insert_logs(std::slice::from_ref(&event)).await {
                Ok(_) => debug!(endpoint = %event.endpoint, method = %event.method, "event recorded"),
                Err(e) => warn!(
                    endpoint = %event.endpoint,
                    method = %event.method,
                    error = %e,
                    "event write failed"
                ),
            }
        });
    }

    /// Inserts spawned but not yet finished.
    pub fn outstanding(&self) -> usize {
        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Wait for every insert spawned so far.
    pub async fn settle(&self) {
        let mut pending = std::mem::take(&mut *self.tasks());
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "event insert task failed");
            }
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
