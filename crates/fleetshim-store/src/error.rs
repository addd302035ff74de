//! Error types for datastore access.

use thiserror::Error;

/// Result type alias for datastore operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a [`crate::Datastore`].
///
/// Every variant is an ordinary, recoverable failure: callers fall back
/// or degrade, they never abort the process.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connect(String),

    #[error("timed out waiting for the datastore")]
    Timeout,

    #[error("query error: {0}")]
    Query(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}
