//! Error types for graph store access and synchronization.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Connectivity failure or timeout. The assembled graph is untouched and
    /// the call can be retried.
    #[error("Graph store unavailable: {0}")]
    Unavailable(String),

    #[error("Refusing to clear the entire store while {in_flight} synchronization(s) are in flight")]
    DestructiveOperationMisuse { in_flight: usize },

    #[error("A full clear is in progress; retry once it completes")]
    ClearInProgress,

    #[error("Failed to decode stored graph data: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// True when retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::ClearInProgress)
    }
}

/// Run `call` under `limit`; an expired call becomes `StoreError::Unavailable`.
pub async fn within<T>(
    limit: Duration,
    operation: &str,
    call: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::unavailable(format!(
            "{operation} timed out after {limit:?}"
        ))),
    }
}

impl From<neo4rs::Error> for StoreError {
    fn from(e: neo4rs::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}
