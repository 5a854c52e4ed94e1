//!  Commit creation and per-revision change extraction
//!
//!  commits are the atomic units of change in Git. In revwiki:
//! - each editor session creates exactly one commit on `main`
//! - the first-parent position of that commit is its revision number
//! - copies and moves are recorded as trailers in the commit message, since
//!   git itself keeps no copy provenance
//!
//! this module handles commit creation, message trailers and diff operations

use chrono::{DateTime, TimeZone, Utc};
use git2::{Delta, Diff, DiffOptions, Repository};
use serde::{Deserialize, Serialize};

use crate::storage::error::{RepositoryError, RepositoryResult};
use crate::storage::tree::TreeHandle;
use crate::storage::types::{
    is_same_or_descendant, CommitId, CopySource, GitSignature, PathAction, Revision, TreeId,
};

/// a copy (or the copy half of a move) made by one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRecord {
    pub from: String,
    pub revision: Revision,
    pub to: String,
}

impl CopyRecord {
    /// the copy source of `path` if it lives at or under this copy's target
    pub fn source_of(&self, path: &str) -> Option<CopySource> {
        if !is_same_or_descendant(&self.to, path) {
            return None;
        }
        let rest = &path[self.to.len()..];
        Some(CopySource::new(format!("{}{}", self.from, rest), self.revision))
    }
}

/// A decoded commit of the wiki history.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    /// the message as the author wrote it, without trailers
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub copies: Vec<CopyRecord>,
}

impl CommitInfo {
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> RepositoryResult<Self> {
        let author = commit.author();
        let time = commit.time();
        let timestamp = Utc
            .timestamp_opt(time.seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);
        let (message, copies) = CommitMessage::parse(commit.message().unwrap_or(""))?;

        Ok(Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message,
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@unknown").to_string(),
            timestamp,
            copies,
        })
    }

    /// the copy source of a path added by this commit, if it was copied
    pub fn copy_source(&self, path: &str) -> Option<CopySource> {
        self.copies.iter().find_map(|copy| copy.source_of(path))
    }
}

/// Writes a commit object without moving any ref; `main` is advanced
/// separately once the revision index agrees.
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parents: Vec<CommitId>,
    message: String,
    signature: GitSignature,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            signature: GitSignature::revwiki(),
        }
    }

    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// used as both author and committer
    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    pub fn commit(self) -> RepositoryResult<CommitId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| RepositoryError::Internal("commit requires a tree".to_string()))?;

        let tree = self.repo.find_tree(tree_id.raw())?;
        let sig = self.signature.to_git2_signature()?;

        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()?;

        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self.repo.commit(
            None,
            &sig,
            &sig,
            &self.message,
            &tree,
            &parent_refs,
        )?;

        Ok(CommitId::new(oid))
    }
}

pub fn get_commit(repo: &Repository, id: CommitId) -> RepositoryResult<CommitInfo> {
    let commit = repo.find_commit(id.raw())?;
    CommitInfo::from_git2(&commit)
}

/// the tree a commit points at
pub fn get_tree_at_commit(repo: &Repository, commit_id: CommitId) -> RepositoryResult<TreeHandle<'_>> {
    let commit = repo.find_commit(commit_id.raw())?;
    let tree = commit.tree()?;
    Ok(TreeHandle::new(tree))
}

/// create the revision 0 commit for a new repository
pub fn create_initial_commit(repo: &Repository, signature: &GitSignature) -> RepositoryResult<CommitId> {
    let tree_id = crate::storage::tree::create_initial_tree(repo)?;

    CommitBuilder::new(repo)
        .tree(tree_id)
        .message("[revwiki] Initialize repository")
        .signature(signature.clone())
        .commit()
}

/// one changed file in one commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    pub path: String,
    pub action: PathAction,
}

/// compute the files a commit changed relative to its parent
///
/// additions that fall under one of the commit's copy records carry their
/// copy source
pub fn revision_changes(
    repo: &Repository,
    parent: CommitId,
    commit: &CommitInfo,
) -> RepositoryResult<Vec<PathChange>> {
    let old_tree = repo.find_commit(parent.raw())?.tree()?;
    let new_tree = repo.find_commit(commit.id.raw())?.tree()?;

    let mut opts = DiffOptions::new();
    let diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;

    extract_changes_from_diff(&diff, commit)
}

/// compute changes from a diff
fn extract_changes_from_diff(diff: &Diff<'_>, commit: &CommitInfo) -> RepositoryResult<Vec<PathChange>> {
    let mut changes = Vec::new();

    for delta in diff.deltas() {
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .and_then(|p| p.to_str())
            .ok_or_else(|| RepositoryError::CorruptedMetadata("non utf-8 path in tree".to_string()))?
            .to_string();

        let action = match delta.status() {
            Delta::Added => PathAction::Added {
                copied_from: commit.copy_source(&path),
            },
            Delta::Deleted => PathAction::Deleted,
            Delta::Modified | Delta::Typechange => PathAction::Modified,
            other => {
                return Err(RepositoryError::Internal(format!(
                    "unexpected delta {:?} for {}",
                    other, path
                )))
            }
        };

        changes.push(PathChange { path, action });
    }

    Ok(changes)
}

/// message formatting for wiki commits
///
/// The author's message comes first. Each copy made by the commit follows as
/// a `Copied-From:` trailer holding a JSON [`CopyRecord`].
pub struct CommitMessage;

impl CommitMessage {
    const COPY_TRAILER: &'static str = "Copied-From: ";

    /// append copy trailers to a message
    pub fn format(message: &str, copies: &[CopyRecord]) -> RepositoryResult<String> {
        if copies.is_empty() {
            return Ok(message.to_string());
        }
        let mut formatted = message.trim_end().to_string();
        formatted.push_str("\n\n");
        for copy in copies {
            formatted.push_str(Self::COPY_TRAILER);
            formatted.push_str(&serde_json::to_string(copy)?);
            formatted.push('\n');
        }
        Ok(formatted)
    }

    /// split a raw commit message into the author's message and copy records
    pub fn parse(raw: &str) -> RepositoryResult<(String, Vec<CopyRecord>)> {
        let mut copies = Vec::new();
        let mut lines = Vec::new();
        for line in raw.lines() {
            match line.strip_prefix(Self::COPY_TRAILER) {
                Some(json) => copies.push(serde_json::from_str(json)?),
                None => lines.push(line),
            }
        }
        let message = lines.join("\n").trim_end().to_string();
        Ok((message, copies))
    }
}
