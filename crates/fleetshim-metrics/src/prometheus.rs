//! Prometheus text exposition format.
//!
//! Renders a cluster snapshot for scraping by a Prometheus server or
//! compatible agent.

use crate::aggregator::ClusterSnapshot;

/// Render a snapshot into Prometheus text format. All series are gauges
/// except the log total, which only grows.
pub fn render_prometheus(snapshot: &ClusterSnapshot) -> String {
    let mut out = String::new();

    out.push_str("# HELP fleetshim_active_nodes Primary plus live replica nodes.\n");
    out.push_str("# TYPE fleetshim_active_nodes gauge\n");
    out.push_str(&format!("fleetshim_active_nodes {}\n", snapshot.active_nodes));

    out.push_str("# HELP fleetshim_total_logs Request log entries, persisted and buffered.\n");
    out.push_str("# TYPE fleetshim_total_logs counter\n");
    out.push_str(&format!("fleetshim_total_logs {}\n", snapshot.total_log_count));

    out.push_str("# HELP fleetshim_throughput_rps Requests per second over the trailing window.\n");
    out.push_str("# TYPE fleetshim_throughput_rps gauge\n");
    out.push_str(&format!(
        "fleetshim_throughput_rps {}\n",
        snapshot.throughput_display()
    ));

    out.push_str("# HELP fleetshim_buffered_events Telemetry events awaiting flush.\n");
    out.push_str("# TYPE fleetshim_buffered_events gauge\n");
    out.push_str(&format!(
        "fleetshim_buffered_events {}\n",
        snapshot.buffered_events
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_snapshot() -> ClusterSnapshot {
        ClusterSnapshot {
            active_nodes: 4,
            total_log_count: 1_234,
            current_throughput: 12.34,
            buffered_events: 7,
        }
    }

    #[test]
    fn render_snapshot() {
        let output = render_prometheus(&test_snapshot());

        assert!(output.contains("fleetshim_active_nodes 4\n"));
        assert!(output.contains("fleetshim_total_logs 1234\n"));
        assert!(output.contains("fleetshim_throughput_rps 12.3\n"));
        assert!(output.contains("fleetshim_buffered_events 7\n"));
        assert!(output.contains("# TYPE fleetshim_total_logs counter"));
    }

    #[test]
    fn undefined_throughput_renders_zero() {
        let mut snapshot = test_snapshot();
        snapshot.current_throughput = f64::NAN;
        let output = render_prometheus(&snapshot);
        assert!(output.contains("fleetshim_throughput_rps 0.0\n"));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus(&test_snapshot());

        // Every sample line is `name value` with a numeric value.
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, value) = line.split_once(' ').expect("sample line");
            assert!(name.starts_with("fleetshim_"), "bad name: {line}");
            assert!(value.parse::<f64>().is_ok(), "bad value: {line}");
        }
    }
}
