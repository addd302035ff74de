//! fleetshim-core: shared types and configuration for fleetshim.
//!
//! fleetshim is a control-plane shim in front of a primary/replica
//! datastore cluster. This crate holds the record types every other
//! crate passes around and the `fleetshim.toml` configuration model.

pub mod config;
pub mod types;

pub use config::{ConfigError, FleetConfig};
pub use types::*;
