//! storage layer for revwiki
//!
//! this module provides a revision-numbered, path-versioned repository on top
//! of git. The page store above it uses the [`RepositoryOperations`] and
//! [`CommitEditor`] traits and never touches git2 directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              GitRepository / GitCommitEditor                │
//! │   (revisions, path logs, atomic edits, locks, authors)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │   commit    │       │    refs     │
//!  │  (paths)    │       │  (changes)  │       │ (revisions) │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```ignore
//! use revwiki::storage::{GitRepository, RepositoryOperations, Revision};
//!
//! let repo = GitRepository::open_or_init("./wiki")?;
//!
//! let mut editor = repo.open_editor("Create FrontPage")?;
//! editor.add_file("FrontPage", b"Hello")?;
//! let revision = editor.close()?;
//!
//! let content = repo.read_file("FrontPage", revision)?;
//! ```

mod commit;
mod editor;
mod error;
mod operations;
mod refs;
mod repository;
mod tree;
mod types;

// Re-export public API
pub use commit::{CommitInfo, CommitMessage, CopyRecord};
pub use error::{RepositoryError, RepositoryResult};
pub use operations::{CommitEditor, RepositoryOperations};
pub use repository::{GitRepository, RepositoryStats};
pub use types::{
    is_same_or_descendant, CommitId, CopySource, DirEntry, Expected, GitSignature, LockInfo, LogEntry,
    LogFilter, LogQuery, NodeKind, PathAction, Revision, TreeId,
};
