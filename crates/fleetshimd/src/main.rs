//! fleetshimd: the fleetshim daemon.
//!
//! Single binary that assembles every fleetshim subsystem:
//! - Datastore pools (primary + replica)
//! - Telemetry buffer, flusher and shutdown drain
//! - Read router and write path
//! - Scaling dispatcher, optional autoscaler
//! - Metrics aggregator
//! - REST API
//!
//! # Usage
//!
//! ```text
//! fleetshimd serve --config /etc/fleetshim/fleetshim.toml --port 5000
//! ```

mod serve;
mod signal;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fleetshim_core::FleetConfig;
use fleetshim_core::config::{LogFormat, StoreBackend};

const DEFAULT_CONFIG_PATH: &str = "fleetshim.toml";
const DEFAULT_LOG_FILTER: &str = "info,fleetshimd=debug,fleetshim=debug";

#[derive(Parser)]
#[command(name = "fleetshimd", about = "fleetshim daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the API and run the background loops until terminated.
    Serve {
        /// Config file. Defaults to ./fleetshim.toml when present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on. Overrides `server.port`.
        #[arg(long)]
        port: Option<u16>,

        /// Use the in-process datastore instead of MySQL.
        #[arg(long)]
        memory_store: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            memory_store,
        } => {
            let config = load_config(config.as_deref(), port, memory_store)?;
            init_tracing(config.logging.format);
            serve::run(config).await
        }
    }
}

/// File (if any), then `DB_*` environment, then CLI flags.
fn load_config(
    path: Option<&Path>,
    port: Option<u16>,
    memory_store: bool,
) -> anyhow::Result<FleetConfig> {
    let mut config = match path {
        Some(path) => FleetConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            FleetConfig::from_file(Path::new(DEFAULT_CONFIG_PATH))
                .with_context(|| format!("loading config {DEFAULT_CONFIG_PATH}"))?
        }
        None => FleetConfig::default(),
    };

    config.apply_env();
    if let Some(port) = port {
        config.server.port = port;
    }
    if memory_store {
        config.datastore.backend = StoreBackend::Memory;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetshim.toml");
        std::fs::write(
            &path,
            "[server]\nport = 7000\n\n[scaling]\nmax_replicas = 5\n",
        )
        .unwrap();

        let config = load_config(Some(&path), Some(8080), true).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.scaling.max_replicas, 5);
        assert_eq!(config.datastore.backend, StoreBackend::Memory);
    }

    #[test]
    fn invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetshim.toml");
        std::fs::write(&path, "[scaling]\nmin_replicas = 4\nmax_replicas = 2\n").unwrap();

        let err = load_config(Some(&path), None, false).unwrap_err();
        assert!(format!("{err:#}").contains("max_replicas"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/fleetshim.toml")), None, false);
        assert!(err.is_err());
    }
}
