//! Data-path errors.

use thiserror::Error;

use fleetshim_store::StoreError;

#[derive(Debug, Error)]
pub enum RouteError {
    /// Every read candidate failed. No data is synthesized.
    #[error("all {attempts} read paths failed, last error: {last_error}")]
    Exhausted { attempts: usize, last_error: String },

    /// The primary rejected or never received the write.
    #[error("write to primary failed: {0}")]
    Write(#[source] StoreError),
}
