//! Storage layer error types
//!
//! All errors that can occur while talking to the backing repository are
//! defined here. We use `thiserror` for ergonomic error definition.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::Revision;

/// the main error type for repository operations
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// the path does not exist in the given revision
    #[error("path not found: {path} in {revision}")]
    PathNotFound { path: String, revision: Revision },

    /// the path already exists where it must not
    #[error("path already exists: {0}")]
    PathExists(String),

    /// the path changed after the revision the caller based its edit on
    #[error("path out of date: {path} expected {expected}, last changed in {actual}")]
    OutOfDate {
        path: String,
        expected: Revision,
        actual: Revision,
    },

    /// someone else holds a lock on the path
    #[error("path locked: {path} is locked by {owner}")]
    Locked { path: String, owner: String },

    /// unlock with a token that does not match the held lock
    #[error("lock not held: {0}")]
    LockNotHeld(String),

    /// the revision is beyond head
    #[error("no such revision: {0}")]
    NoSuchRevision(Revision),

    /// the credentials were rejected
    #[error("authentication failed for {0}")]
    Authentication(String),

    /// repository metadata could not be understood
    #[error("corrupted repository metadata: {0}")]
    CorruptedMetadata(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// repo is not initialized
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RepositoryError::PathNotFound { .. } | RepositoryError::NoSuchRevision(_)
        )
    }

    /// check if this error is a conflict with a concurrent change
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RepositoryError::PathExists(_) | RepositoryError::OutOfDate { .. }
        )
    }

    /// check if retrying with fresher state could succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RepositoryError::OutOfDate { .. } | RepositoryError::Locked { .. }
        )
    }
}

/// result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = RepositoryError::PathNotFound {
            path: "FrontPage".to_string(),
            revision: Revision::new(3),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());

        let conflict = RepositoryError::OutOfDate {
            path: "FrontPage".to_string(),
            expected: Revision::new(2),
            actual: Revision::new(3),
        };
        assert!(!conflict.is_not_found());
        assert!(conflict.is_conflict());
        assert!(conflict.is_retriable());

        let locked = RepositoryError::Locked {
            path: "FrontPage".to_string(),
            owner: "mth".to_string(),
        };
        assert!(!locked.is_conflict());
        assert!(locked.is_retriable());
    }
}
