//! fleetshim-metrics: operational snapshot of the cluster.
//!
//! [`MetricsAggregator`] reconciles three independent sources into one
//! [`ClusterSnapshot`]:
//!
//! ```text
//! active_nodes       = 1 + live replica count   (1 when no source answers)
//! total_log_count    = persisted rows + buffered/in-flight events
//! current_throughput = rows in the last 10s / 10
//! ```
//!
//! A failing source degrades its own field only. [`render_prometheus`]
//! exposes the same snapshot in Prometheus text format.

pub mod aggregator;
pub mod prometheus;

pub use aggregator::{ClusterSnapshot, MetricsAggregator, THROUGHPUT_WINDOW, format_rate};
pub use prometheus::render_prometheus;
