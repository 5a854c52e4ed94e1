//!   Core Git repository wrapper.
//!
//!  This is the central component of the storage layer. It wraps
//!  `git2::Repository` with thread-safe access and implements
//!  [`RepositoryOperations`] on top of it: revision-numbered reads, path-scoped
//!  logs that follow copies, atomic commit editors and path locks.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use git2::Repository;
use parking_lot::{Mutex, RwLock};
use ulid::Ulid;

use crate::storage::commit::{self, CommitInfo, PathChange};
use crate::storage::editor::GitCommitEditor;
use crate::storage::error::{RepositoryError, RepositoryResult};
use crate::storage::operations::{CommitEditor, RepositoryOperations};
use crate::storage::refs::{RefManager, RevisionIndex};
use crate::storage::tree::TreeHandle;
use crate::storage::types::{
    DirEntry, GitSignature, LockInfo, LogEntry, LogFilter, LogQuery, NodeKind, PathAction, Revision,
};

/// The main Git repository wrapper.
///
/// This provides thread-safe access to all Git operations.
/// Clone this to share across threads - it uses Arc internally. Clones made
/// with [`GitRepository::with_signature`] share the repository but commit as
/// a different user.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
    signature: GitSignature,
}

struct GitRepositoryInner {
    state: Mutex<RepoState>,
    locks: Mutex<HashMap<String, LockInfo>>,
    authors: RwLock<Option<BTreeSet<String>>>,
    path: PathBuf,
}

/// the git repository together with its revision numbering
///
/// Held under one mutex: git2 handles are not `Sync`, and holding the lock
/// for a whole commit is what makes commits atomic and strictly ordered.
pub(crate) struct RepoState {
    pub(crate) repo: Repository,
    pub(crate) revisions: RevisionIndex,
}

impl GitRepository {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> RepositoryResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| RepositoryError::NotInitialized(path.to_path_buf()))?;
        let revisions = RefManager::load_revisions(&repo)?;
        tracing::debug!(path = %path.display(), head = %revisions.head(), "opened repository");

        Ok(Self::from_state(path, RepoState { repo, revisions }))
    }

    /// Initialize a new repository holding only revision 0.
    pub fn init(path: impl AsRef<Path>) -> RepositoryResult<Self> {
        let path = path.as_ref();
        let repo = Repository::init(path)?;

        let initial = commit::create_initial_commit(&repo, &GitSignature::revwiki())?;
        RefManager::init_main_branch(&repo, initial)?;
        let revisions = RefManager::load_revisions(&repo)?;
        tracing::info!(path = %path.display(), "initialized repository");

        Ok(Self::from_state(path, RepoState { repo, revisions }))
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> RepositoryResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open(path)
        } else {
            Self::init(path)
        }
    }

    fn from_state(path: &Path, state: RepoState) -> Self {
        Self {
            inner: Arc::new(GitRepositoryInner {
                state: Mutex::new(state),
                locks: Mutex::new(HashMap::new()),
                authors: RwLock::new(None),
                path: path.to_path_buf(),
            }),
            signature: GitSignature::revwiki(),
        }
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// the signature commits from this handle carry
    pub fn signature(&self) -> &GitSignature {
        &self.signature
    }

    /// A handle on the same repository acting as another user.
    pub fn with_signature(&self, signature: GitSignature) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            signature,
        }
    }

    /// Only let these users commit or take locks.
    pub fn restrict_authors<I, S>(&self, authors: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.inner.authors.write() = Some(authors.into_iter().map(Into::into).collect());
    }

    fn authenticate(&self) -> RepositoryResult<()> {
        match &*self.inner.authors.read() {
            Some(authors) if !authors.contains(&self.signature.name) => {
                Err(RepositoryError::Authentication(self.signature.name.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Execute a function with the repository locked.
    pub(crate) fn with_state<F, T>(&self, f: F) -> RepositoryResult<T>
    where
        F: FnOnce(&RepoState) -> RepositoryResult<T>,
    {
        let state = self.inner.state.lock();
        f(&state)
    }

    /// Get statistics about the repository.
    pub fn stats(&self) -> RepositoryResult<RepositoryStats> {
        self.with_state(|state| {
            let head = state.head();
            let files = state.tree(head)?.flatten()?;
            Ok(RepositoryStats {
                head,
                file_count: files.len(),
                lock_count: self.inner.locks.lock().len(),
            })
        })
    }
}

impl RepoState {
    pub(crate) fn head(&self) -> Revision {
        self.revisions.head()
    }

    pub(crate) fn tree(&self, revision: Revision) -> RepositoryResult<TreeHandle<'_>> {
        let id = self.revisions.commit(revision)?;
        commit::get_tree_at_commit(&self.repo, id)
    }

    pub(crate) fn node_kind(&self, path: &str, revision: Revision) -> RepositoryResult<Option<NodeKind>> {
        Ok(self.tree(revision)?.node_kind(path))
    }

    fn commit_info(&self, revision: Revision) -> RepositoryResult<CommitInfo> {
        commit::get_commit(&self.repo, self.revisions.commit(revision)?)
    }

    fn changes(&self, revision: Revision, info: &CommitInfo) -> RepositoryResult<Vec<PathChange>> {
        match revision.prev() {
            Some(parent) => commit::revision_changes(&self.repo, self.revisions.commit(parent)?, info),
            None => Ok(Vec::new()),
        }
    }

    /// Walk revisions newest first, collecting changes the query matches.
    ///
    /// The walk follows the node named by the query path: it ends where that
    /// node was born, or, unless `stop_on_copy` is set, carries on from the
    /// copy source the node was born from. A path absent at the upper bound
    /// has no log.
    pub(crate) fn log(&self, query: &LogQuery) -> RepositoryResult<Vec<LogEntry>> {
        let head = self.head();
        let to = query.to.unwrap_or(head);
        if to > head {
            return Err(RepositoryError::NoSuchRevision(to));
        }

        let mut entries = Vec::new();
        let mut current = query.clone();
        if self.node_kind(&current.path, to)?.is_none() {
            return Ok(entries);
        }

        let floor = query.from.get().max(1);
        let mut revision = to.get();
        while revision >= floor {
            let rev = Revision::new(revision);
            let info = self.commit_info(rev)?;
            let changes = self.changes(rev, &info)?;

            for change in changes.iter().filter(|change| current.matches(&change.path)) {
                entries.push(log_entry(change, rev, &info));
                if current.filter == LogFilter::PathOnly {
                    if let Some(removal) = copy_source_removal(change, &changes) {
                        entries.push(log_entry(removal, rev, &info));
                    }
                }
            }

            if let Some(limit) = query.limit {
                if entries.len() >= limit {
                    entries.truncate(limit);
                    break;
                }
            }

            let existed_before = self.node_kind(&current.path, Revision::new(revision - 1))?.is_some();
            if !existed_before {
                match info.copy_source(&current.path) {
                    Some(source) if !query.stop_on_copy => {
                        current.path = source.path;
                        revision = source.revision.get();
                        continue;
                    }
                    _ => break,
                }
            }
            revision -= 1;
        }

        Ok(entries)
    }

    /// the newest change at or under `path` up to `at`
    pub(crate) fn last_changed(&self, path: &str, at: Revision) -> RepositoryResult<Option<LogEntry>> {
        let query = LogQuery::descendants(path).stop_on_copy(true).to(at).limit(1);
        Ok(self.log(&query)?.into_iter().next())
    }

    pub(crate) fn entry(&self, path: &str, revision: Revision) -> RepositoryResult<Option<DirEntry>> {
        let tree = self.tree(revision)?;
        let kind = match tree.node_kind(path) {
            Some(kind) => kind,
            None => return Ok(None),
        };
        let size = tree.size(&self.repo, path)?;

        let (last_changed, author, timestamp) = match self.last_changed(path, revision)? {
            Some(change) => (change.revision, change.author, change.timestamp),
            None => {
                let info = self.commit_info(Revision::ZERO)?;
                (Revision::ZERO, info.author_name, info.timestamp)
            }
        };

        Ok(Some(DirEntry {
            path: path.to_string(),
            kind,
            size,
            last_changed,
            author,
            timestamp,
        }))
    }
}

fn log_entry(change: &PathChange, revision: Revision, info: &CommitInfo) -> LogEntry {
    LogEntry {
        path: change.path.clone(),
        revision,
        author: info.author_name.clone(),
        timestamp: info.timestamp,
        message: info.message.clone(),
        action: change.action.clone(),
    }
}

/// the deletion of a copy's source in the same commit, i.e. the other half
/// of a move
fn copy_source_removal<'a>(change: &PathChange, changes: &'a [PathChange]) -> Option<&'a PathChange> {
    let source = match &change.action {
        PathAction::Added { copied_from: Some(source) } => source,
        _ => return None,
    };
    changes
        .iter()
        .find(|other| other.path == source.path && other.action == PathAction::Deleted)
}

impl RepositoryOperations for GitRepository {
    fn user(&self) -> &str {
        &self.signature.name
    }

    fn latest_revision(&self) -> RepositoryResult<Revision> {
        self.with_state(|state| Ok(state.head()))
    }

    fn log(&self, query: &LogQuery) -> RepositoryResult<Vec<LogEntry>> {
        tracing::debug!(path = %query.path, from = %query.from, to = ?query.to, "log");
        self.with_state(|state| state.log(query))
    }

    fn entry(&self, path: &str, revision: Revision) -> RepositoryResult<Option<DirEntry>> {
        self.with_state(|state| state.entry(path, revision))
    }

    fn read_file(&self, path: &str, revision: Revision) -> RepositoryResult<Vec<u8>> {
        self.with_state(|state| {
            state
                .tree(revision)?
                .read_file(&state.repo, path)?
                .ok_or_else(|| RepositoryError::PathNotFound {
                    path: path.to_string(),
                    revision,
                })
        })
    }

    fn list_dir(&self, path: &str, revision: Revision) -> RepositoryResult<Vec<DirEntry>> {
        self.with_state(|state| {
            let children = match state.tree(revision)?.list_dir(&state.repo, path)? {
                Some(children) => children,
                None => return Ok(Vec::new()),
            };
            let mut entries = Vec::with_capacity(children.len());
            for child in children {
                if let Some(entry) = state.entry(&child, revision)? {
                    entries.push(entry);
                }
            }
            Ok(entries)
        })
    }

    fn open_editor(&self, message: &str) -> RepositoryResult<Box<dyn CommitEditor + '_>> {
        self.authenticate()?;
        let state = self.inner.state.lock();
        let editor = GitCommitEditor::open(state, &self.inner.locks, self.signature.clone(), message)?;
        Ok(Box::new(editor))
    }

    fn lock(&self, path: &str, comment: &str) -> RepositoryResult<LockInfo> {
        self.authenticate()?;
        let head = self.latest_revision()?;
        if self.with_state(|state| state.node_kind(path, head))?.is_none() {
            return Err(RepositoryError::PathNotFound {
                path: path.to_string(),
                revision: head,
            });
        }

        let mut locks = self.inner.locks.lock();
        if let Some(existing) = locks.get(path) {
            if existing.owner != self.signature.name {
                return Err(RepositoryError::Locked {
                    path: path.to_string(),
                    owner: existing.owner.clone(),
                });
            }
            return Ok(existing.clone());
        }

        let lock = LockInfo {
            path: path.to_string(),
            owner: self.signature.name.clone(),
            token: Ulid::new().to_string().to_lowercase(),
            comment: comment.to_string(),
            created: Utc::now(),
        };
        locks.insert(path.to_string(), lock.clone());
        tracing::debug!(path, owner = %lock.owner, "locked");
        Ok(lock)
    }

    fn unlock(&self, path: &str, token: &str) -> RepositoryResult<()> {
        let mut locks = self.inner.locks.lock();
        match locks.get(path) {
            Some(lock) if lock.token == token => {
                locks.remove(path);
                Ok(())
            }
            _ => Err(RepositoryError::LockNotHeld(path.to_string())),
        }
    }

    fn lock_info(&self, path: &str) -> RepositoryResult<Option<LockInfo>> {
        Ok(self.inner.locks.lock().get(path).cloned())
    }
}

/// Statistics about the repository.
#[derive(Debug, Clone)]
pub struct RepositoryStats {
    pub head: Revision,
    pub file_count: usize,
    pub lock_count: usize,
}

impl std::fmt::Display for RepositoryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Repository Statistics:")?;
        writeln!(f, "  Head: {}", self.head)?;
        writeln!(f, "  Files: {}", self.file_count)?;
        writeln!(f, "  Locks: {}", self.lock_count)
    }
}
