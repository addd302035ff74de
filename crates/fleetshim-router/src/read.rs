//! Read router: replica first, primary as the single fallback.
//!
//! Candidates are tried in order. Each attempt is bounded by a timeout
//! and classified as success or failure; the first success wins. When
//! every candidate fails the router returns [`RouteError::Exhausted`]
//! rather than stale or partial data.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use fleetshim_core::{ReadSource, SiteEntry};
use fleetshim_store::{ClusterPools, Datastore, StoreError, StoreResult};

use crate::error::RouteError;

/// One step in the fallback chain.
#[derive(Clone)]
pub struct ReadCandidate {
    pub source: ReadSource,
    pub store: Arc<dyn Datastore>,
}

/// A successful read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub source: ReadSource,
    /// Zero or one entries: the latest row, if the table has any.
    pub data: Vec<SiteEntry>,
}

pub struct ReadRouter {
    candidates: Vec<ReadCandidate>,
    attempt_timeout: Duration,
}

impl ReadRouter {
    /// Replica first, then primary.
    pub fn new(pools: &ClusterPools, attempt_timeout: Duration) -> Self {
        let candidates = [ReadSource::Replica, ReadSource::PrimaryFallback]
            .into_iter()
            .map(|source| ReadCandidate {
                source,
                store: Arc::clone(pools.role(source.role())),
            })
            .collect();
        Self::with_candidates(candidates, attempt_timeout)
    }

    pub fn with_candidates(candidates: Vec<ReadCandidate>, attempt_timeout: Duration) -> Self {
        Self {
            candidates,
            attempt_timeout,
        }
    }

    /// Fetch the most recent entry from the first candidate that answers.
    pub async fn read_latest(&self) -> Result<ReadOutcome, RouteError> {
        let mut last_error = String::from("no read candidates configured");

        for candidate in &self.candidates {
            match attempt(candidate, self.attempt_timeout).await {
                Ok(row) => {
                    debug!(source = ?candidate.source, found = row.is_some(), "read served");
                    return Ok(ReadOutcome {
                        source: candidate.source,
                        data: row.into_iter().collect(),
                    });
                }
                Err(e) => {
                    warn!(
                        source = ?candidate.source,
                        role = %candidate.source.role(),
                        error = %e,
                        "read attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(RouteError::Exhausted {
            attempts: self.candidates.len(),
            last_error,
        })
    }
}

async fn attempt(candidate: &ReadCandidate, timeout: Duration) -> StoreResult<Option<SiteEntry>> {
    match tokio::time::timeout(timeout, candidate.store.latest_entry()).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}
