//! fleetshim-store: datastore access for fleetshim.
//!
//! The [`Datastore`] trait is the narrow capability every other crate
//! depends on. Two backends implement it:
//!
//! - [`MySqlStore`]: one `sqlx` pool per topology role.
//! - [`MemoryStore`]: in-process tables with an availability switch,
//!   used for development and tests.
//!
//! [`ClusterPools`] pairs a primary and a replica store.

pub mod cluster;
pub mod datastore;
pub mod error;
pub mod memory;
pub mod mysql;

pub use cluster::ClusterPools;
pub use datastore::Datastore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use mysql::MySqlStore;
