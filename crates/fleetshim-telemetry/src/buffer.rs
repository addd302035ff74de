//! Telemetry buffer: in-memory staging for request events.
//!
//! The buffer is append-only between flushes. A flush takes the whole
//! current batch and leaves an empty vector in its place before any I/O
//! happens, so events recorded while the insert is in flight land in the
//! next batch. The mutex is only held for a push or a swap, never across
//! an `.await`.
//!
//! Every hand-off between the buffer and the datastore (a batch taken,
//! a batch returned) bumps an epoch under the same lock. A reader that
//! sees the same epoch before and after its datastore queries, with no
//! insert in flight, knows no batch moved underneath it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, error};

use fleetshim_core::TelemetryEvent;
use fleetshim_store::Datastore;

/// Result of one flush cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered; no write was issued.
    Empty,
    /// The batch was written.
    Persisted(usize),
    /// The write failed and the batch was discarded.
    Dropped { count: usize, error: String },
}

/// Point-in-time view of the buffer, read under one lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCount {
    /// Buffered events plus events owned by an in-flight flush.
    pub events: u64,
    pub epoch: u64,
    /// No flush insert is outstanding.
    pub settled: bool,
}

#[derive(Default)]
struct State {
    events: Vec<TelemetryEvent>,
    /// Events taken by a flush whose insert has not returned yet.
    in_flight: u64,
    epoch: u64,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    /// Woken whenever an insert returns.
    returned: Notify,
}

/// Process-wide telemetry buffer. Clones share the same storage.
#[derive(Clone, Default)]
pub struct TelemetryBuffer {
    inner: Arc<Inner>,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event. O(1), never fails.
    pub fn record(&self, event: TelemetryEvent) {
        self.state().events.push(event);
    }

    /// Events waiting for the next flush.
    pub fn len(&self) -> usize {
        self.state().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffered events plus events owned by an in-flight flush.
    pub fn pending(&self) -> u64 {
        self.pending_count().events
    }

    /// Pending events together with the epoch they were read at.
    ///
    /// Read under the same lock the flush swaps under, so a batch is
    /// always counted on exactly one side of the swap.
    pub fn pending_count(&self) -> PendingCount {
        let state = self.state();
        PendingCount {
            events: state.events.len() as u64 + state.in_flight,
            epoch: state.epoch,
            settled: state.in_flight == 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.state().epoch
    }

    /// Resolve once no flush insert is outstanding.
    pub async fn settled(&self) {
        loop {
            let returned = self.inner.returned.notified();
            let idle = self.state().in_flight == 0;
            if idle {
                return;
            }
            returned.await;
        }
    }

    /// Write everything currently buffered as one bulk insert.
    ///
    /// A failed batch is logged and discarded; it is never re-buffered.
    pub async fn flush(&self, store: &dyn Datastore) -> FlushOutcome {
        let batch = {
            let mut state = self.state();
            let batch = std::mem::take(&mut state.events);
            if !batch.is_empty() {
                state.in_flight += batch.len() as u64;
                state.epoch = state.epoch.wrapping_add(1);
            }
            batch
        };

        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let count = batch.len();
        let result = store.insert_logs(&batch).await;
        {
            let mut state = self.state();
            state.in_flight = state.in_flight.saturating_sub(count as u64);
            state.epoch = state.epoch.wrapping_add(1);
        }
        self.inner.returned.notify_waiters();

        match result {
            Ok(_) => {
                debug!(count, "telemetry batch flushed");
                FlushOutcome::Persisted(count)
            }
            Err(e) => {
                error!(count, error = %e, "telemetry flush failed, batch discarded");
                FlushOutcome::Dropped {
                    count,
                    error: e.to_string(),
                }
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
