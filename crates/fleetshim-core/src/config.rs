//! fleetshim.toml configuration parser.
//!
//! Every section is optional; missing keys fall back to the defaults
//! below. Datastore credentials and hosts can also come from the
//! environment (`DB_USER`, `DB_PASSWORD`, `DB_NAME`, `DB_HOST_PRIMARY`,
//! `DB_HOST_REPLICA`), which take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::NodeRole;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub server: ServerConfig,
    pub datastore: DatastoreConfig,
    pub telemetry: TelemetryConfig,
    pub scaling: ScalingConfig,
    pub orchestrator: OrchestratorConfig,
    pub replica_source: ReplicaSourceConfig,
    pub autoscale: AutoscaleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 5000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Mysql,
    /// Single in-process store shared by both roles (development only).
    Memory,
}

/// Connection settings for one datastore role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeEndpoint {
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
}

impl NodeEndpoint {
    fn with_host(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: 3306,
            max_connections: 50,
        }
    }
}

impl Default for NodeEndpoint {
    fn default() -> Self {
        Self::with_host("localhost")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    pub backend: StoreBackend,
    pub user: String,
    pub password: String,
    pub database: String,
    pub primary: NodeEndpoint,
    pub replica: NodeEndpoint,
    /// How long a request waits for a pooled connection.
    pub acquire_timeout_ms: u64,
    /// Upper bound on a single read attempt, per role.
    pub query_timeout_ms: u64,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Mysql,
            user: "root".to_string(),
            password: String::new(),
            database: "app_db".to_string(),
            primary: NodeEndpoint::with_host("primary-db"),
            replica: NodeEndpoint::with_host("replica-db"),
            acquire_timeout_ms: 2_000,
            query_timeout_ms: 3_000,
        }
    }
}

impl DatastoreConfig {
    pub fn endpoint(&self, role: NodeRole) -> &NodeEndpoint {
        match role {
            NodeRole::Primary => &self.primary,
            NodeRole::Replica => &self.replica,
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub flush_interval_ms: u64,
    /// Request paths never recorded as telemetry.
    pub excluded_paths: Vec<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 5_000,
            excluded_paths: [
                "/api/scale",
                "/api/stats",
                "/api/logs",
                "/api/replicas",
                "/health",
                "/metrics",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl TelemetryConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub min_replicas: u32,
    pub max_replicas: u32,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Container CLI used for compose and listing commands.
    pub program: String,
    /// Compose project name (`-p`). Also stripped from listed replica names.
    pub project: String,
    /// Compose service that runs replica nodes.
    pub service: String,
    pub workdir: Option<PathBuf>,
    /// Exported as `DOCKER_API_VERSION` when set.
    pub docker_api_version: Option<String>,
    /// Shell command run after every acknowledged scale.
    pub post_scale_hook: Option<String>,
    pub command_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            project: "fleetshim".to_string(),
            service: "replica-db".to_string(),
            workdir: None,
            docker_api_version: Some("1.44".to_string()),
            post_scale_hook: None,
            command_timeout_ms: 60_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaSourceKind {
    /// Ask the orchestrator for its live replica listing.
    Orchestrator,
    /// Read the last published count from `count_file`.
    CountFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaSourceConfig {
    /// Sources tried in order until one answers.
    pub order: Vec<ReplicaSourceKind>,
    pub count_file: Option<PathBuf>,
}

impl Default for ReplicaSourceConfig {
    fn default() -> Self {
        Self {
            order: vec![ReplicaSourceKind::Orchestrator],
            count_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscaleConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Average replica CPU percent above which one replica is added.
    pub cpu_up_threshold: f64,
    /// Average replica CPU percent below which one replica is removed.
    pub cpu_down_threshold: f64,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 5_000,
            cpu_up_threshold: 10.0,
            cpu_down_threshold: 5.0,
        }
    }
}

impl AutoscaleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `DB_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply `DB_*` overrides from an arbitrary lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let ds = &mut self.datastore;
        if let Some(v) = lookup("DB_USER") {
            ds.user = v;
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            ds.password = v;
        }
        if let Some(v) = lookup("DB_NAME") {
            ds.database = v;
        }
        if let Some(v) = lookup("DB_HOST_PRIMARY") {
            ds.primary.host = v;
        }
        if let Some(v) = lookup("DB_HOST_REPLICA") {
            ds.replica.host = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scaling = &self.scaling;
        if scaling.min_replicas < 1 {
            return Err(ConfigError::Invalid(
                "scaling.min_replicas must be at least 1".to_string(),
            ));
        }
        if scaling.max_replicas < scaling.min_replicas {
            return Err(ConfigError::Invalid(format!(
                "scaling.max_replicas ({}) is below min_replicas ({})",
                scaling.max_replicas, scaling.min_replicas
            )));
        }
        if self.telemetry.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "telemetry.flush_interval_ms must be positive".to_string(),
            ));
        }
        if self.autoscale.cpu_down_threshold >= self.autoscale.cpu_up_threshold {
            return Err(ConfigError::Invalid(
                "autoscale.cpu_down_threshold must be below cpu_up_threshold".to_string(),
            ));
        }
        if self.autoscale.enabled && self.autoscale.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "autoscale.interval_ms must be positive".to_string(),
            ));
        }
        if self.replica_source.order.is_empty() {
            return Err(ConfigError::Invalid(
                "replica_source.order needs at least one source".to_string(),
            ));
        }
        if self
            .replica_source
            .order
            .contains(&ReplicaSourceKind::CountFile)
            && self.replica_source.count_file.is_none()
        {
            return Err(ConfigError::Invalid(
                "replica_source.order lists count_file but replica_source.count_file is unset"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
