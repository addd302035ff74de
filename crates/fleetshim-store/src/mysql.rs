//! MySQL backend: one lazily connected `sqlx` pool per topology role.
//!
//! Pools connect on first use so an unreachable replica never blocks
//! startup; the failure surfaces on the first query instead, where the
//! read router treats it like any other failed attempt.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{FromRow, MySql, QueryBuilder};
use tracing::debug;

use fleetshim_core::config::DatastoreConfig;
use fleetshim_core::{NodeRole, RequestLogEntry, SiteEntry, TelemetryEvent};

use crate::datastore::Datastore;
use crate::error::{StoreError, StoreResult};

const CREATE_SITE_ENTRIES: &str = "\
CREATE TABLE IF NOT EXISTS site_entries (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
    title VARCHAR(255) NOT NULL,
    description TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

const CREATE_REQUEST_LOGS: &str = "\
CREATE TABLE IF NOT EXISTS request_logs (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
    endpoint VARCHAR(255) NOT NULL,
    method VARCHAR(16) NOT NULL,
    node_used VARCHAR(64) NOT NULL,
    timestamp TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
    INDEX idx_request_logs_timestamp (timestamp)
)";

#[derive(FromRow)]
struct SiteEntryRow {
    id: u64,
    title: String,
    description: String,
    created_at: DateTime<Utc>,
}

impl From<SiteEntryRow> for SiteEntry {
    fn from(row: SiteEntryRow) -> Self {
        SiteEntry {
            id: row.id,
            title: row.title,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct RequestLogRow {
    id: u64,
    endpoint: String,
    method: String,
    node_used: String,
    timestamp: DateTime<Utc>,
}

impl From<RequestLogRow> for RequestLogEntry {
    fn from(row: RequestLogRow) -> Self {
        RequestLogEntry {
            id: row.id,
            endpoint: row.endpoint,
            method: row.method,
            node_used: row.node_used,
            timestamp: row.timestamp,
        }
    }
}

/// Map a sqlx error onto the store taxonomy.
fn classify(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::PoolClosed => StoreError::Unavailable("pool closed".to_string()),
        sqlx::Error::Io(e) => StoreError::Connect(e.to_string()),
        sqlx::Error::Tls(e) => StoreError::Connect(e.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}

/// A datastore role backed by a MySQL connection pool.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    role: NodeRole,
}

impl MySqlStore {
    /// Build a lazily connected pool for `role` from the datastore config.
    pub fn connect_lazy(config: &DatastoreConfig, role: NodeRole) -> Self {
        let endpoint = config.endpoint(role);
        let options = MySqlConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(endpoint.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_lazy_with(options);

        debug!(
            %role,
            host = %endpoint.host,
            port = endpoint.port,
            max_connections = endpoint.max_connections,
            "mysql pool configured"
        );
        Self { pool, role }
    }
}

#[async_trait]
impl Datastore for MySqlStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        for ddl in [CREATE_SITE_ENTRIES, CREATE_REQUEST_LOGS] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Schema(e.to_string()))?;
        }
        debug!(role = %self.role, "schema ensured");
        Ok(())
    }

    async fn latest_entry(&self) -> StoreResult<Option<SiteEntry>> {
        let row = sqlx::query_as::<_, SiteEntryRow>(
            "SELECT id, title, description, created_at FROM site_entries ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        Ok(row.map(SiteEntry::from))
    }

    async fn insert_entry(&self, title: &str, description: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO site_entries (title, description) VALUES (?, ?)")
            .bind(title)
            .bind(description)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn insert_logs(&self, events: &[TelemetryEvent]) -> StoreResult<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<MySql> =
            QueryBuilder::new("INSERT INTO request_logs (endpoint, method, node_used) ");
        builder.push_values(events, |mut row, event| {
            row.push_bind(event.endpoint.clone())
                .push_bind(event.method.clone())
                .push_bind(event.node_used.clone());
        });

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn count_logs(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM request_logs")
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(count.max(0) as u64)
    }

    async fn count_logs_since(&self, window: Duration) -> StoreResult<u64> {
        // Window is evaluated on the datastore clock, the same clock that
        // stamped the rows.
        let micros = i64::try_from(window.as_micros()).unwrap_or(i64::MAX);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM request_logs \
             WHERE timestamp >= NOW(3) - INTERVAL ? MICROSECOND",
        )
        .bind(micros)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(count.max(0) as u64)
    }

    async fn recent_logs(&self, limit: u32) -> StoreResult<Vec<RequestLogEntry>> {
        let rows = sqlx::query_as::<_, RequestLogRow>(
            "SELECT id, endpoint, method, node_used, timestamp \
             FROM request_logs ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows.into_iter().map(RequestLogEntry::from).collect())
    }
}
