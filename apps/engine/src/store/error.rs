//! Persistent store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Typed quota failure: the write was rejected whole, never truncated.
    /// Callers react (eviction, banner); they never retry blindly.
    #[error("storage quota exceeded: write of {attempted} bytes over {budget}-byte budget")]
    QuotaExceeded { attempted: u64, budget: u64 },

    #[error("invalid data in store: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub fn is_quota(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}
