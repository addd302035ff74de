//! Role-qualified datastore handles.

use std::sync::Arc;

use tracing::info;

use fleetshim_core::NodeRole;
use fleetshim_core::config::{DatastoreConfig, StoreBackend};

use crate::datastore::Datastore;
use crate::memory::MemoryStore;
use crate::mysql::MySqlStore;

/// The primary and replica datastore roles.
///
/// Cheap to clone; both handles are `Arc`s.
#[derive(Clone)]
pub struct ClusterPools {
    primary: Arc<dyn Datastore>,
    replica: Arc<dyn Datastore>,
}

impl ClusterPools {
    pub fn new(primary: Arc<dyn Datastore>, replica: Arc<dyn Datastore>) -> Self {
        Self { primary, replica }
    }

    /// Build both roles from configuration.
    ///
    /// The memory backend shares one store between the roles, so the
    /// "replica" never lags.
    pub fn from_config(config: &DatastoreConfig) -> Self {
        match config.backend {
            StoreBackend::Mysql => {
                info!(
                    primary = %config.primary.host,
                    replica = %config.replica.host,
                    database = %config.database,
                    "using mysql datastore"
                );
                Self::new(
                    Arc::new(MySqlStore::connect_lazy(config, NodeRole::Primary)),
                    Arc::new(MySqlStore::connect_lazy(config, NodeRole::Replica)),
                )
            }
            StoreBackend::Memory => {
                info!("using in-memory datastore");
                Self::shared(MemoryStore::new())
            }
        }
    }

    /// One store serving both roles.
    pub fn shared(store: MemoryStore) -> Self {
        let store: Arc<dyn Datastore> = Arc::new(store);
        Self::new(store.clone(), store)
    }

    pub fn primary(&self) -> &Arc<dyn Datastore> {
        &self.primary
    }

    pub fn replica(&self) -> &Arc<dyn Datastore> {
        &self.replica
    }

    pub fn role(&self, role: NodeRole) -> &Arc<dyn Datastore> {
        match role {
            NodeRole::Primary => &self.primary,
            NodeRole::Replica => &self.replica,
        }
    }
}
