//! The datastore capability trait.

use std::time::Duration;

use async_trait::async_trait;

use fleetshim_core::{RequestLogEntry, SiteEntry, TelemetryEvent};

use crate::error::StoreResult;

/// Operations fleetshim needs from one datastore role.
///
/// Implementations must be cheap to share (`Arc<dyn Datastore>`) and
/// report pool exhaustion or connection loss as an `Err`, never a panic.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Create `site_entries` and `request_logs` if they don't exist yet.
    async fn ensure_schema(&self) -> StoreResult<()>;

    /// The most recently created entry, if any.
    async fn latest_entry(&self) -> StoreResult<Option<SiteEntry>>;

    /// Insert exactly one entry.
    async fn insert_entry(&self, title: &str, description: &str) -> StoreResult<()>;

    /// Bulk-insert request log rows. Returns the number of rows written.
    ///
    /// An empty slice is a no-op and issues no statement.
    async fn insert_logs(&self, events: &[TelemetryEvent]) -> StoreResult<u64>;

    /// Total persisted request log rows.
    async fn count_logs(&self) -> StoreResult<u64>;

    /// Request log rows written within the trailing `window`.
    async fn count_logs_since(&self, window: Duration) -> StoreResult<u64>;

    /// The `limit` most recent request log rows, newest first.
    async fn recent_logs(&self, limit: u32) -> StoreResult<Vec<RequestLogEntry>>;
}
