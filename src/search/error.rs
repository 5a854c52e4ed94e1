//! Search indexing error types.

use thiserror::Error;

use crate::vc::PageStoreError;

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    /// The page store failed.
    #[error("page store error: {0}")]
    Store(#[from] PageStoreError),

    /// The index itself failed.
    #[error("index error: {0}")]
    Index(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    /// authentication failures end an indexing pass instead of skipping a page
    pub fn is_authentication(&self) -> bool {
        matches!(self, IndexError::Store(err) if err.is_authentication())
    }
}
