//!  Main branch management and revision numbering.
//!
//!  Every commit lives on `refs/heads/main`. Revision numbers are not stored
//!  anywhere: they are the first-parent positions along `main`, rebuilt into
//!  a [`RevisionIndex`] when the repository is opened and extended on every
//!  commit.

use git2::Repository;

use crate::storage::error::{RepositoryError, RepositoryResult};
use crate::storage::types::{CommitId, Revision};

/// Manages the `main` reference.
pub struct RefManager;

impl RefManager {
    /// the full ref path of the only branch revwiki writes
    pub const MAIN: &'static str = "refs/heads/main";

    /// Get the commit `main` points at.
    pub fn head_commit(repo: &Repository) -> RepositoryResult<CommitId> {
        let reference = repo
            .find_reference(Self::MAIN)
            .map_err(|_| RepositoryError::CorruptedMetadata(format!("{} is missing", Self::MAIN)))?;
        let commit = reference.peel_to_commit()?;
        Ok(CommitId::new(commit.id()))
    }

    /// Point `main` (and HEAD) at the initial commit.
    pub fn init_main_branch(repo: &Repository, initial_commit: CommitId) -> RepositoryResult<()> {
        repo.reference(Self::MAIN, initial_commit.raw(), false, "revwiki: initialize")?;
        repo.set_head(Self::MAIN)?;
        Ok(())
    }

    /// Move `main` forward only if it still points to the expected commit.
    ///
    /// This provides compare-and-swap semantics, so a commit built on a stale
    /// head can never be published.
    pub fn advance_main(repo: &Repository, expected: CommitId, new_target: CommitId) -> RepositoryResult<()> {
        let current = Self::head_commit(repo)?;
        if current != expected {
            return Err(RepositoryError::Internal(format!(
                "main moved from {} to {} underneath a commit",
                expected.short(),
                current.short()
            )));
        }

        let mut reference = repo.find_reference(Self::MAIN)?;
        reference.set_target(new_target.raw(), &format!("revwiki: commit {}", new_target.short()))?;
        Ok(())
    }

    /// Walk `main` back along first parents and number the commits.
    pub fn load_revisions(repo: &Repository) -> RepositoryResult<RevisionIndex> {
        let mut chain = Vec::new();
        let mut commit = repo.find_commit(Self::head_commit(repo)?.raw())?;
        loop {
            chain.push(CommitId::new(commit.id()));
            if commit.parent_count() == 0 {
                break;
            }
            commit = commit.parent(0)?;
        }
        chain.reverse();
        Ok(RevisionIndex { commits: chain })
    }
}

/// revision number -> commit, for every commit on `main`
#[derive(Debug, Clone)]
pub struct RevisionIndex {
    commits: Vec<CommitId>,
}

impl RevisionIndex {
    /// the newest revision
    pub fn head(&self) -> Revision {
        Revision::new(self.commits.len() as u64 - 1)
    }

    pub fn head_commit(&self) -> CommitId {
        self.commits[self.commits.len() - 1]
    }

    /// the commit that produced a revision
    pub fn commit(&self, revision: Revision) -> RepositoryResult<CommitId> {
        self.commits
            .get(revision.get() as usize)
            .copied()
            .ok_or(RepositoryError::NoSuchRevision(revision))
    }

    /// record a new head and return its revision
    pub fn push(&mut self, commit: CommitId) -> Revision {
        self.commits.push(commit);
        self.head()
    }
}
