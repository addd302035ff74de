//! Shutdown coordinator: drains the telemetry buffer before exit.
//!
//! ```text
//! RUNNING ──begin_drain()──▶ DRAINING ──finish_drain()──▶ TERMINATED
//! ```
//!
//! `begin_drain` is single-shot: only the first caller wins the
//! transition and broadcasts the shutdown signal to background loops.
//! Later calls are no-ops. `finish_drain` waits for outstanding
//! [`EventRecorder`] inserts before the final buffer flush.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::watch;
use tracing::{debug, error, info};

use fleetshim_store::Datastore;

use crate::buffer::{FlushOutcome, TelemetryBuffer};
use crate::recorder::EventRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    Draining,
    Terminated,
}

impl ShutdownPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ShutdownPhase::Running,
            1 => ShutdownPhase::Draining,
            _ => ShutdownPhase::Terminated,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ShutdownPhase::Running => 0,
            ShutdownPhase::Draining => 1,
            ShutdownPhase::Terminated => 2,
        }
    }
}

pub struct ShutdownCoordinator {
    phase: AtomicU8,
    buffer: TelemetryBuffer,
    store: Arc<dyn Datastore>,
    recorder: Option<EventRecorder>,
    signal_tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new(buffer: TelemetryBuffer, store: Arc<dyn Datastore>) -> Self {
        let (signal_tx, _) = watch::channel(false);
        Self {
            phase: AtomicU8::new(ShutdownPhase::Running.as_u8()),
            buffer,
            store,
            recorder: None,
            signal_tx,
        }
    }

    /// Wait for this recorder's inserts during `finish_drain`.
    pub fn with_recorder(mut self, recorder: EventRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// A receiver that flips to `true` when draining starts.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal_tx.subscribe()
    }

    pub fn phase(&self) -> ShutdownPhase {
        ShutdownPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// RUNNING → DRAINING. Returns false if shutdown already started.
    pub fn begin_drain(&self) -> bool {
        let won = self
            .phase
            .compare_exchange(
                ShutdownPhase::Running.as_u8(),
                ShutdownPhase::Draining.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();

        if won {
            info!(pending = self.buffer.pending(), "shutdown started, draining telemetry");
            self.signal_tx.send_replace(true);
        } else {
            debug!(phase = ?self.phase(), "shutdown already in progress");
        }
        won
    }

    /// Final flush, then DRAINING → TERMINATED.
    ///
    /// Returns `None` unless the coordinator is draining. A failed final
    /// flush is logged and shutdown still completes.
    pub async fn finish_drain(&self) -> Option<FlushOutcome> {
        if self.phase() != ShutdownPhase::Draining {
            return None;
        }

        if let Some(recorder) = &self.recorder {
            let outstanding = recorder.outstanding();
            if outstanding > 0 {
                info!(outstanding, "waiting for event inserts");
            }
            recorder.settle().await;
        }

        let outcome = self.buffer.flush(self.store.as_ref()).await;
        match &outcome {
            FlushOutcome::Empty => info!("telemetry buffer already empty"),
            FlushOutcome::Persisted(count) => info!(count, "final telemetry flush complete"),
            FlushOutcome::Dropped { count, error } => {
                error!(count, %error, "final telemetry flush failed, exiting anyway")
            }
        }

        self.phase
            .store(ShutdownPhase::Terminated.as_u8(), Ordering::SeqCst);
        Some(outcome)
    }

    /// `begin_drain` followed by `finish_drain`.
    pub async fn drain(&self) -> Option<FlushOutcome> {
        if !self.begin_drain() {
            return None;
        }
        self.finish_drain().await
    }
}
