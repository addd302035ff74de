//! Write path: every write goes to the primary.

use std::sync::Arc;

use tracing::{debug, error};

use fleetshim_store::{ClusterPools, Datastore};

use crate::error::RouteError;

pub const DEFAULT_TITLE: &str = "Untitled Entry";
pub const DEFAULT_DESCRIPTION: &str = "Manual Entry";

/// A validated entry ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub title: String,
    pub description: String,
}

impl NewEntry {
    /// Build from an optional client message. Missing or blank messages
    /// get the default title.
    pub fn from_message(message: Option<&str>) -> Self {
        let title = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_TITLE);
        Self {
            title: title.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

pub struct WritePath {
    primary: Arc<dyn Datastore>,
}

impl WritePath {
    pub fn new(pools: &ClusterPools) -> Self {
        Self {
            primary: Arc::clone(pools.primary()),
        }
    }

    /// Insert exactly one entry on the primary.
    pub async fn write_entry(&self, entry: &NewEntry) -> Result<(), RouteError> {
        match self
            .primary
            .insert_entry(&entry.title, &entry.description)
            .await
        {
            Ok(()) => {
                debug!(title = %entry.title, "entry written to primary");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "primary write failed");
                Err(RouteError::Write(e))
            }
        }
    }
}
