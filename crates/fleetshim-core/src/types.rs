//! Domain types for fleetshim.
//!
//! `SiteEntry` and `RequestLogEntry` mirror rows owned by the datastore.
//! `TelemetryEvent` is the in-memory form of a request log row before it
//! has been flushed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Node tags written into `request_logs.node_used`.
pub mod node_tag {
    pub const PRIMARY: &str = "primary";
    pub const REPLICA: &str = "replica";
    pub const PRIMARY_FALLBACK: &str = "primary-fallback";
    pub const ORCHESTRATOR: &str = "orchestrator";
    pub const UNAVAILABLE: &str = "unavailable";
    /// Requests the shim answered without touching a datastore role.
    pub const BACKEND: &str = "backend";
}

/// Operation labels written into `request_logs.method` for data-path events.
pub mod operation {
    pub const READ: &str = "READ";
    pub const WRITE: &str = "WRITE";
    pub const SCALE: &str = "SCALE";
}

// ── Topology ───────────────────────────────────────────────────────

/// Topology role of a datastore node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// The single writable, authoritative node.
    Primary,
    /// A read-only node that may lag behind the primary.
    Replica,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Primary => "primary",
            NodeRole::Replica => "replica",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path served a read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadSource {
    Replica,
    PrimaryFallback,
}

impl ReadSource {
    /// The role queried for this source.
    pub fn role(&self) -> NodeRole {
        match self {
            ReadSource::Replica => NodeRole::Replica,
            ReadSource::PrimaryFallback => NodeRole::Primary,
        }
    }

    /// Tag recorded in the request log when this source served a read.
    pub fn node_tag(&self) -> &'static str {
        match self {
            ReadSource::Replica => node_tag::REPLICA,
            ReadSource::PrimaryFallback => node_tag::PRIMARY_FALLBACK,
        }
    }
}

/// Derived view of the cluster: one primary plus a live replica count.
///
/// Never stored; rebuilt on every aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClusterTopology {
    pub replica_count: u32,
}

impl ClusterTopology {
    pub fn new(replica_count: u32) -> Self {
        Self { replica_count }
    }

    /// Topology with only the primary known to be alive.
    pub fn primary_only() -> Self {
        Self { replica_count: 0 }
    }

    /// Primary plus replicas. Always at least 1.
    pub fn active_nodes(&self) -> u32 {
        self.replica_count.saturating_add(1)
    }
}

// ── Records ────────────────────────────────────────────────────────

/// A persisted business record. Created only on the primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// One observed request event, tagged with the role that handled it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub id: u64,
    pub endpoint: String,
    pub method: String,
    pub node_used: String,
    pub timestamp: DateTime<Utc>,
}

/// A request event held in memory until the next flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub endpoint: String,
    pub method: String,
    pub node_used: String,
}

impl TelemetryEvent {
    pub fn new(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        node_used: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            node_used: node_used.into(),
        }
    }
}
