use thiserror::Error;

use crate::spotify::UpstreamError;
use crate::storage::DatabaseError;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Cache duration of {0}s is out of range")]
    InvalidCacheDuration(u64),
    #[error("Coordinator '{0}' not found")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
    #[error("Coordinator is shutting down")]
    Unavailable,
    #[error("Upstream refused credentials: {0}")]
    UpstreamAuth(String),
    #[error("Upstream temporarily unavailable: {0}")]
    UpstreamTransient(String),
}

impl From<UpstreamError> for CoordinatorError {
    fn from(e: UpstreamError) -> Self {
        if e.is_auth() {
            CoordinatorError::UpstreamAuth(e.to_string())
        } else {
            CoordinatorError::UpstreamTransient(e.to_string())
        }
    }
}
