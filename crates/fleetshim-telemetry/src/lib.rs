//! fleetshim-telemetry: request telemetry pipeline.
//!
//! High-frequency request events are staged in memory and written to
//! the primary as one batch per flush interval.
//!
//! # Architecture
//!
//! ```text
//! TelemetryBuffer
//!   ├── record() ← called per intercepted request, never blocks
//!   ├── flush()  → swap buffer, one bulk insert into request_logs
//!   └── pending_count() → buffered + in-flight count and flush epoch
//!
//! TelemetryFlusher::run() → periodic flush until shutdown
//! EventRecorder           → best-effort single-row insert, spawned
//! ShutdownCoordinator     → RUNNING → DRAINING → TERMINATED, final flush
//! ```

pub mod buffer;
pub mod flusher;
pub mod recorder;
pub mod shutdown;

pub use buffer::{FlushOutcome, PendingCount, TelemetryBuffer};
pub use flusher::TelemetryFlusher;
pub use recorder::EventRecorder;
pub use shutdown::{ShutdownCoordinator, ShutdownPhase};
