use thiserror::Error;

use crate::application::repos::RepoError;

use super::store::StoreError;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Data-layer failures pass through untouched.
    #[error(transparent)]
    Repository(#[from] RepoError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cache store cannot enumerate keys by pattern")]
    PatternSweepUnsupported,
    #[error("cache payload could not be encoded: {0}")]
    Serialization(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CacheError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Repository(RepoError::NotFound))
    }
}
