//! The capability the page store consumes.
//!
//! Everything above the storage layer talks to the backing repository through
//! [`RepositoryOperations`] and [`CommitEditor`] only, which keeps the store
//! testable against scripted fakes.

use crate::storage::error::RepositoryResult;
use crate::storage::types::{DirEntry, Expected, LockInfo, LogEntry, LogQuery, Revision};

/// Read access, commit editors and locks on a revision-numbered repository.
///
/// Implementations are shared between request threads.
pub trait RepositoryOperations: Send + Sync {
    /// the user commits and locks are attributed to
    fn user(&self) -> &str;

    fn latest_revision(&self) -> RepositoryResult<Revision>;

    /// changed paths matching the query, newest first
    fn log(&self, query: &LogQuery) -> RepositoryResult<Vec<LogEntry>>;

    /// the node at `path` in `revision`, or `None` if nothing is there
    fn entry(&self, path: &str, revision: Revision) -> RepositoryResult<Option<DirEntry>>;

    fn read_file(&self, path: &str, revision: Revision) -> RepositoryResult<Vec<u8>>;

    /// immediate children of a directory; empty if the directory is absent
    fn list_dir(&self, path: &str, revision: Revision) -> RepositoryResult<Vec<DirEntry>>;

    /// Start an atomic commit.
    ///
    /// Nothing becomes visible until [`CommitEditor::close`] succeeds;
    /// dropping the editor abandons the commit. An open editor may hold the
    /// repository exclusively, so callers gather what they need to read
    /// before opening one.
    fn open_editor(&self, message: &str) -> RepositoryResult<Box<dyn CommitEditor + '_>>;

    fn lock(&self, path: &str, comment: &str) -> RepositoryResult<LockInfo>;

    fn unlock(&self, path: &str, token: &str) -> RepositoryResult<()>;

    fn lock_info(&self, path: &str) -> RepositoryResult<Option<LockInfo>>;
}

/// The path primitives of one pending commit.
///
/// Each primitive checks its own precondition against the head the editor
/// was opened on and fails without side effects.
pub trait CommitEditor {
    /// create a file that must not exist yet
    fn add_file(&mut self, path: &str, content: &[u8]) -> RepositoryResult<()>;

    /// replace a file that last changed in exactly `base`
    fn modify_file(&mut self, path: &str, base: Revision, content: &[u8]) -> RepositoryResult<()>;

    /// remove a file or directory
    fn delete(&mut self, path: &str, expected: Expected) -> RepositoryResult<()>;

    /// copy `from@from_revision` to `to` and remove `from`
    fn move_file(&mut self, from: &str, from_revision: Revision, to: &str) -> RepositoryResult<()>;

    /// like [`CommitEditor::move_file`] for a whole directory
    fn move_dir(&mut self, from: &str, from_revision: Revision, to: &str) -> RepositoryResult<()>;

    /// publish the commit and return its revision
    fn close(self: Box<Self>) -> RepositoryResult<Revision>;
}
