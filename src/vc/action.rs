//! Commit actions: a list of path operations applied as one commit.
//!
//! Mutations are data. A [`CommitAction`] holds [`PathOperation`]s and a
//! single interpreter drives them against one commit editor. The editor is
//! closed only after every operation succeeded; on the first failure it is
//! dropped, nothing is committed and the remaining operations are never
//! issued.

use thiserror::Error;

use crate::storage::{CommitEditor, Expected, NodeKind, RepositoryError, RepositoryOperations, Revision};

/// one primitive edit of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathOperation {
    AddFile {
        path: String,
        content: Vec<u8>,
    },
    ModifyFile {
        path: String,
        base: Revision,
        content: Vec<u8>,
    },
    Delete {
        path: String,
        expected: Expected,
    },
    /// copy `from@from_revision` to `to`, then remove `from`
    Move {
        node: NodeKind,
        from: String,
        from_revision: Revision,
        to: String,
    },
}

impl PathOperation {
    /// the path the operation is about (the source, for moves)
    pub fn path(&self) -> &str {
        match self {
            PathOperation::AddFile { path, .. }
            | PathOperation::ModifyFile { path, .. }
            | PathOperation::Delete { path, .. } => path,
            PathOperation::Move { from, .. } => from,
        }
    }

    fn apply(&self, editor: &mut dyn CommitEditor) -> Result<(), RepositoryError> {
        match self {
            PathOperation::AddFile { path, content } => editor.add_file(path, content),
            PathOperation::ModifyFile { path, base, content } => editor.modify_file(path, *base, content),
            PathOperation::Delete { path, expected } => editor.delete(path, *expected),
            PathOperation::Move {
                node: NodeKind::File,
                from,
                from_revision,
                to,
            } => editor.move_file(from, *from_revision, to),
            PathOperation::Move {
                node: NodeKind::Directory,
                from,
                from_revision,
                to,
            } => editor.move_dir(from, *from_revision, to),
        }
    }
}

/// why a commit action did not commit
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("could not open commit: {0}")]
    Open(#[source] RepositoryError),

    /// operation `index` failed; later operations were not issued
    #[error("operation {index} on {path} failed: {source}")]
    Operation {
        index: usize,
        path: String,
        #[source]
        source: RepositoryError,
    },

    #[error("commit failed: {0}")]
    Close(#[source] RepositoryError),
}

impl ActionError {
    /// the index of the operation that failed, if one did
    pub fn failed_operation(&self) -> Option<usize> {
        match self {
            ActionError::Operation { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn into_repository_error(self) -> RepositoryError {
        match self {
            ActionError::Open(source) | ActionError::Close(source) => source,
            ActionError::Operation { source, .. } => source,
        }
    }
}

/// A unit of work executed as a single atomic commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAction {
    message: String,
    operations: Vec<PathOperation>,
}

impl CommitAction {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            operations: Vec::new(),
        }
    }

    /// append an operation
    pub fn with(mut self, operation: PathOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn operations(&self) -> &[PathOperation] {
        &self.operations
    }

    /// Run every operation against one editor and commit.
    pub fn execute(&self, ops: &dyn RepositoryOperations) -> Result<Revision, ActionError> {
        let mut editor = ops.open_editor(&self.message).map_err(ActionError::Open)?;

        for (index, operation) in self.operations.iter().enumerate() {
            tracing::debug!(index, ?operation, "applying");
            if let Err(source) = operation.apply(editor.as_mut()) {
                tracing::debug!(index, error = %source, "operation failed, abandoning commit");
                return Err(ActionError::Operation {
                    index,
                    path: operation.path().to_string(),
                    source,
                });
            }
        }

        editor.close().map_err(ActionError::Close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vc::testing::{EditorCall, ScriptedRepository};

    fn two_moves() -> CommitAction {
        CommitAction::new("Rename")
            .with(PathOperation::Move {
                node: NodeKind::File,
                from: "Old".to_string(),
                from_revision: Revision::new(3),
                to: "New".to_string(),
            })
            .with(PathOperation::Move {
                node: NodeKind::Directory,
                from: "Old-attachments".to_string(),
                from_revision: Revision::new(5),
                to: "New-attachments".to_string(),
            })
    }

    #[test]
    fn test_all_operations_then_close() {
        let repo = ScriptedRepository::new(Revision::new(5));
        let revision = two_moves().execute(&repo).unwrap();

        assert_eq!(revision, Revision::new(6));
        assert_eq!(
            repo.calls(),
            vec![
                EditorCall::Open("Rename".to_string()),
                EditorCall::MoveFile("Old".to_string(), Revision::new(3), "New".to_string()),
                EditorCall::MoveDir(
                    "Old-attachments".to_string(),
                    Revision::new(5),
                    "New-attachments".to_string()
                ),
                EditorCall::Close,
            ]
        );
    }

    #[test]
    fn test_first_failure_stops_the_action() {
        let repo = ScriptedRepository::new(Revision::new(5)).fail_on(
            "Old",
            RepositoryError::Locked {
                path: "Old".to_string(),
                owner: "bob".to_string(),
            },
        );

        let err = two_moves().execute(&repo).unwrap_err();
        assert_eq!(err.failed_operation(), Some(0));
        assert!(matches!(err.into_repository_error(), RepositoryError::Locked { .. }));
        // neither the second move nor the close happened
        assert_eq!(
            repo.calls(),
            vec![
                EditorCall::Open("Rename".to_string()),
                EditorCall::MoveFile("Old".to_string(), Revision::new(3), "New".to_string()),
            ]
        );
        assert_eq!(repo.latest_revision().unwrap(), Revision::new(5));
    }
}
