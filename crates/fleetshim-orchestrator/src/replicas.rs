//! Live replica count sources.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use fleetshim_core::config::{ReplicaSourceConfig, ReplicaSourceKind};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::Orchestrator;

#[async_trait]
pub trait ReplicaCountSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn live_replica_count(&self) -> OrchestratorResult<u32>;
}

/// Counts the replicas the orchestrator lists as running.
pub struct OrchestratorReplicaCount {
    orchestrator: Arc<dyn Orchestrator>,
}

impl OrchestratorReplicaCount {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl ReplicaCountSource for OrchestratorReplicaCount {
    fn name(&self) -> &'static str {
        "orchestrator"
    }

    async fn live_replica_count(&self) -> OrchestratorResult<u32> {
        let replicas = self.orchestrator.list_live_replicas().await?;
        Ok(u32::try_from(replicas.len()).unwrap_or(u32::MAX))
    }
}

/// A file holding the last acknowledged replica count as plain text.
///
/// Written after every successful scale, so other processes (and this
/// one, when the orchestrator is slow to answer) can read the count
/// without shelling out.
#[derive(Debug, Clone)]
pub struct CountFile {
    path: PathBuf,
}

impl CountFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn read(&self) -> OrchestratorResult<u32> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.error(e.to_string()))?;
        content
            .trim()
            .parse::<u32>()
            .map_err(|e| self.error(format!("invalid count {:?}: {e}", content.trim())))
    }

    /// Replace the file contents with `replicas`. Readers see either the
    /// old or the new value, never a partial write.
    ///
    /// Each publish writes its own temp file next to the target, so
    /// concurrent publishes never share one; the last rename wins.
    pub async fn publish(&self, replicas: u32) -> OrchestratorResult<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_replaced(&path, replicas))
            .await
            .map_err(|e| self.error(e.to_string()))?
            .map_err(|e| self.error(e.to_string()))?;
        debug!(path = %self.path.display(), replicas, "published replica count");
        Ok(())
    }

    fn error(&self, reason: String) -> OrchestratorError {
        OrchestratorError::CountFile {
            path: self.path.clone(),
            reason,
        }
    }
}

fn write_replaced(path: &Path, replicas: u32) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    writeln!(tmp, "{replicas}")?;
    tmp.persist(path)?;
    Ok(())
}

#[async_trait]
impl ReplicaCountSource for CountFile {
    fn name(&self) -> &'static str {
        "count_file"
    }

    async fn live_replica_count(&self) -> OrchestratorResult<u32> {
        self.read().await
    }
}

/// Sources tried in order; the first answer wins.
pub struct ReplicaCountChain {
    sources: Vec<Arc<dyn ReplicaCountSource>>,
}

impl ReplicaCountChain {
    pub fn new(sources: Vec<Arc<dyn ReplicaCountSource>>) -> Self {
        Self { sources }
    }

    /// Build the chain named by `replica_source.order`.
    ///
    /// A `count_file` entry without a configured path is skipped;
    /// `FleetConfig::validate` rejects that combination up front.
    pub fn from_config(config: &ReplicaSourceConfig, orchestrator: Arc<dyn Orchestrator>) -> Self {
        let mut sources: Vec<Arc<dyn ReplicaCountSource>> = Vec::new();
        for kind in &config.order {
            match kind {
                ReplicaSourceKind::Orchestrator => sources.push(Arc::new(
                    OrchestratorReplicaCount::new(Arc::clone(&orchestrator)),
                )),
                ReplicaSourceKind::CountFile => match &config.count_file {
                    Some(path) => sources.push(Arc::new(CountFile::new(path.clone()))),
                    None => warn!("count_file source listed without a path, skipping"),
                },
            }
        }
        let chain = Self::new(sources);
        info!(sources = ?chain.source_names(), "replica count sources");
        chain
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl ReplicaCountSource for ReplicaCountChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn live_replica_count(&self) -> OrchestratorResult<u32> {
        for source in &self.sources {
            match source.live_replica_count().await {
                Ok(count) => {
                    debug!(source = source.name(), count, "live replica count");
                    return Ok(count);
                }
                Err(e) => warn!(source = source.name(), error = %e, "replica count source failed"),
            }
        }
        Err(OrchestratorError::NoSource)
    }
}
