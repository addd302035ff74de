//! In-memory datastore.
//!
//! Keeps `site_entries` and `request_logs` as vectors behind a mutex.
//! `set_available(false)` makes every operation fail with
//! [`StoreError::Unavailable`], which is how tests simulate a dead role.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fleetshim_core::{RequestLogEntry, SiteEntry, TelemetryEvent};

use crate::datastore::Datastore;
use crate::error::{StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    entries: Vec<SiteEntry>,
    logs: Vec<RequestLogEntry>,
    next_entry_id: u64,
    next_log_id: u64,
}

/// Shared, cloneable in-memory store. Clones see the same tables.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    available: Arc<AtomicBool>,
    log_batches: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            available: Arc::new(AtomicBool::new(true)),
            log_batches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Toggle whether operations succeed.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of successful bulk log inserts issued so far.
    pub fn log_batches(&self) -> usize {
        self.log_batches.load(Ordering::SeqCst)
    }

    /// Insert log rows stamped with an explicit time.
    pub fn insert_logs_at(&self, events: &[TelemetryEvent], at: DateTime<Utc>) {
        let mut tables = self.tables();
        for event in events {
            tables.next_log_id += 1;
            let id = tables.next_log_id;
            tables.logs.push(RequestLogEntry {
                id,
                endpoint: event.endpoint.clone(),
                method: event.method.clone(),
                node_used: event.node_used.clone(),
                timestamp: at,
            });
        }
    }

    /// Snapshot of all persisted log rows, oldest first.
    pub fn logs(&self) -> Vec<RequestLogEntry> {
        self.tables().logs.clone()
    }

    /// Snapshot of all persisted entries, oldest first.
    pub fn entries(&self) -> Vec<SiteEntry> {
        self.tables().entries.clone()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> StoreResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(
                "memory store marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        self.check()
    }

    async fn latest_entry(&self) -> StoreResult<Option<SiteEntry>> {
        self.check()?;
        Ok(self.tables().entries.last().cloned())
    }

    async fn insert_entry(&self, title: &str, description: &str) -> StoreResult<()> {
        self.check()?;
        let mut tables = self.tables();
        tables.next_entry_id += 1;
        let id = tables.next_entry_id;
        tables.entries.push(SiteEntry {
            id,
            title: title.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn insert_logs(&self, events: &[TelemetryEvent]) -> StoreResult<u64> {
        if events.is_empty() {
            return Ok(0);
        }
        self.check()?;
        self.insert_logs_at(events, Utc::now());
        self.log_batches.fetch_add(1, Ordering::SeqCst);
        Ok(events.len() as u64)
    }

    async fn count_logs(&self) -> StoreResult<u64> {
        self.check()?;
        Ok(self.tables().logs.len() as u64)
    }

    async fn count_logs_since(&self, window: Duration) -> StoreResult<u64> {
        self.check()?;
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let count = self
            .tables()
            .logs
            .iter()
            .filter(|l| l.timestamp >= cutoff)
            .count();
        Ok(count as u64)
    }

    async fn recent_logs(&self, limit: u32) -> StoreResult<Vec<RequestLogEntry>> {
        self.check()?;
        let tables = self.tables();
        Ok(tables
            .logs
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(endpoint: &str) -> TelemetryEvent {
        TelemetryEvent::new(endpoint, "GET", "replica")
    }

    #[tokio::test]
    async fn latest_entry_is_highest_id() {
        let store = MemoryStore::new();
        assert!(store.latest_entry().await.unwrap().is_none());

        store.insert_entry("first", "a").await.unwrap();
        store.insert_entry("second", "b").await.unwrap();

        let latest = store.latest_entry().await.unwrap().unwrap();
        assert_eq!(latest.id, 2);
        assert_eq!(latest.title, "second");
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_available(false);

        assert!(matches!(
            store.latest_entry().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.insert_entry("t", "d").await.is_err());
        assert!(store.insert_logs(&[event("/x")]).await.is_err());
        assert!(store.count_logs().await.is_err());
        assert!(store.recent_logs(10).await.is_err());

        store.set_available(true);
        assert_eq!(store.count_logs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_batch_is_not_a_write() {
        let store = MemoryStore::new();
        assert_eq!(store.insert_logs(&[]).await.unwrap(), 0);
        assert_eq!(store.log_batches(), 0);
    }

    #[tokio::test]
    async fn recent_logs_newest_first_with_limit() {
        let store = MemoryStore::new();
        let events: Vec<_> = (0..15).map(|i| event(&format!("/e{i}"))).collect();
        store.insert_logs(&events).await.unwrap();

        let recent = store.recent_logs(10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].endpoint, "/e14");
        assert_eq!(recent[9].endpoint, "/e5");
        assert!(recent.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[tokio::test]
    async fn count_since_excludes_old_rows() {
        let store = MemoryStore::new();
        let old = Utc::now() - chrono::Duration::seconds(60);
        store.insert_logs_at(&[event("/old"), event("/old")], old);
        store.insert_logs(&[event("/new")]).await.unwrap();

        assert_eq!(store.count_logs().await.unwrap(), 3);
        assert_eq!(
            store.count_logs_since(Duration::from_secs(10)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn clones_share_tables() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.insert_entry("shared", "x").await.unwrap();
        assert_eq!(other.entries().len(), 1);
    }
}
