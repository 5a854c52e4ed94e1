//! Page store error types.

use thiserror::Error;

use crate::storage::{RepositoryError, Revision};
use crate::vc::types::InvalidNameError;

/// Result type for page store operations.
pub type PageStoreResult<T> = Result<T, PageStoreError>;

/// Errors that can occur during page store operations.
#[derive(Debug, Error)]
pub enum PageStoreError {
    /// The page (or attachment) is absent at the revision asked for.
    #[error("not found: {path}{}", at_revision(.revision))]
    NotFound {
        path: String,
        revision: Option<Revision>,
    },

    /// Someone else changed the path after the revision the edit was based on.
    #[error("concurrent modification of {path}: {source}")]
    Conflict {
        path: String,
        #[source]
        source: RepositoryError,
    },

    /// A rename failed; nothing was committed.
    #[error("rename of {from} to {to} failed: {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: RepositoryError,
    },

    /// The repository rejected the user. Retrying will not help.
    #[error("authentication failed for {0}")]
    Authentication(String),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// Page content must be UTF-8 text.
    #[error("invalid content in {path}: {reason}")]
    InvalidContent { path: String, reason: String },

    /// Any other repository failure.
    #[error("repository error: {0}")]
    Repository(#[source] RepositoryError),
}

fn at_revision(revision: &Option<Revision>) -> String {
    match revision {
        Some(revision) => format!(" in {}", revision),
        None => String::new(),
    }
}

fn conflicting_path(err: &RepositoryError) -> String {
    match err {
        RepositoryError::OutOfDate { path, .. } | RepositoryError::PathExists(path) => path.clone(),
        _ => String::new(),
    }
}

impl PageStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PageStoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PageStoreError::Conflict { .. })
    }

    pub fn is_authentication(&self) -> bool {
        match self {
            PageStoreError::Authentication(_) => true,
            PageStoreError::Rename { source, .. } => matches!(source, RepositoryError::Authentication(_)),
            _ => false,
        }
    }

    /// Check if retrying the operation could succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            PageStoreError::Conflict { .. } => true,
            PageStoreError::Rename { source, .. } | PageStoreError::Repository(source) => source.is_retriable(),
            _ => false,
        }
    }
}

impl From<RepositoryError> for PageStoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::PathNotFound { path, revision } => PageStoreError::NotFound {
                path,
                revision: Some(revision),
            },
            RepositoryError::OutOfDate { .. } | RepositoryError::PathExists(_) => PageStoreError::Conflict {
                path: conflicting_path(&err),
                source: err,
            },
            RepositoryError::Authentication(user) => PageStoreError::Authentication(user),
            other => PageStoreError::Repository(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = PageStoreError::from(RepositoryError::OutOfDate {
            path: "FrontPage".to_string(),
            expected: Revision::new(1),
            actual: Revision::new(2),
        });
        assert!(err.is_conflict());
        assert!(err.is_retriable());

        let err = PageStoreError::from(RepositoryError::PathNotFound {
            path: "FrontPage".to_string(),
            revision: Revision::new(3),
        });
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: FrontPage in r3");

        let err = PageStoreError::from(RepositoryError::Authentication("mallory".to_string()));
        assert!(err.is_authentication());
        assert!(!err.is_retriable());

        let err = PageStoreError::from(RepositoryError::Locked {
            path: "FrontPage".to_string(),
            owner: "bob".to_string(),
        });
        assert!(matches!(err, PageStoreError::Repository(RepositoryError::Locked { .. })));
    }
}
