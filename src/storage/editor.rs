//! The git-backed [`CommitEditor`].
//!
//! An editor holds the repository lock from the moment it is opened until it
//! is closed or dropped. Edits are staged against the head it was opened on;
//! `close` writes the staged tree as one commit on `main`.

use std::collections::HashMap;

use parking_lot::{Mutex, MutexGuard};

use crate::storage::commit::{CommitBuilder, CommitMessage, CopyRecord};
use crate::storage::error::{RepositoryError, RepositoryResult};
use crate::storage::operations::CommitEditor;
use crate::storage::refs::RefManager;
use crate::storage::repository::RepoState;
use crate::storage::tree::StagedTree;
use crate::storage::types::{is_same_or_descendant, Expected, GitSignature, LockInfo, NodeKind, Revision};

pub(crate) struct GitCommitEditor<'a> {
    state: MutexGuard<'a, RepoState>,
    locks: &'a Mutex<HashMap<String, LockInfo>>,
    signature: GitSignature,
    message: String,
    base: Revision,
    staged: StagedTree,
    copies: Vec<CopyRecord>,
}

impl<'a> GitCommitEditor<'a> {
    pub(crate) fn open(
        state: MutexGuard<'a, RepoState>,
        locks: &'a Mutex<HashMap<String, LockInfo>>,
        signature: GitSignature,
        message: &str,
    ) -> RepositoryResult<Self> {
        let base = state.head();
        let staged = {
            let tree = state.tree(base)?;
            StagedTree::from_tree(&tree)?
        };

        Ok(Self {
            state,
            locks,
            signature,
            message: message.to_string(),
            base,
            staged,
            copies: Vec::new(),
        })
    }

    /// fail if another user holds a lock on `path` or anything beneath it
    fn check_locks(&self, path: &str) -> RepositoryResult<()> {
        let locks = self.locks.lock();
        let foreign = locks
            .values()
            .find(|lock| is_same_or_descendant(path, &lock.path) && lock.owner != self.signature.name);
        match foreign {
            Some(lock) => Err(RepositoryError::Locked {
                path: lock.path.clone(),
                owner: lock.owner.clone(),
            }),
            None => Ok(()),
        }
    }

    /// a new node at `path` must not collide with an existing node or sit
    /// beneath a file
    fn check_vacant(&self, path: &str) -> RepositoryResult<()> {
        if path.is_empty() || path.starts_with('/') || path.ends_with('/') || path.contains("//") {
            return Err(RepositoryError::Internal(format!("invalid path '{}'", path)));
        }
        if self.staged.contains(path) {
            return Err(RepositoryError::PathExists(path.to_string()));
        }
        let mut ancestor = path;
        while let Some((parent, _)) = ancestor.rsplit_once('/') {
            if self.staged.node_kind(parent) == Some(NodeKind::File) {
                return Err(RepositoryError::PathExists(parent.to_string()));
            }
            ancestor = parent;
        }
        Ok(())
    }

    fn check_current(&self, path: &str, expected: Revision) -> RepositoryResult<()> {
        let actual = self
            .state
            .last_changed(path, self.base)?
            .map(|entry| entry.revision)
            .unwrap_or(Revision::ZERO);
        if actual != expected {
            return Err(RepositoryError::OutOfDate {
                path: path.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn not_found(&self, path: &str) -> RepositoryError {
        RepositoryError::PathNotFound {
            path: path.to_string(),
            revision: self.base,
        }
    }

    fn move_node(&mut self, kind: NodeKind, from: &str, from_revision: Revision, to: &str) -> RepositoryResult<()> {
        if from_revision > self.base {
            return Err(RepositoryError::NoSuchRevision(from_revision));
        }
        if self.state.node_kind(from, from_revision)? != Some(kind) {
            return Err(RepositoryError::PathNotFound {
                path: from.to_string(),
                revision: from_revision,
            });
        }
        if !self.staged.contains(from) {
            return Err(self.not_found(from));
        }
        if let Some(changed) = self.state.last_changed(from, self.base)? {
            if changed.revision > from_revision {
                return Err(RepositoryError::OutOfDate {
                    path: from.to_string(),
                    expected: from_revision,
                    actual: changed.revision,
                });
            }
        }
        if is_same_or_descendant(from, to) {
            return Err(RepositoryError::PathExists(to.to_string()));
        }
        self.check_vacant(to)?;
        self.check_locks(from)?;
        self.check_locks(to)?;

        let source = self.state.tree(from_revision)?;
        self.staged.copy_from(&source, from, to)?;
        self.staged.remove(from)?;
        self.copies.push(CopyRecord {
            from: from.to_string(),
            revision: from_revision,
            to: to.to_string(),
        });
        Ok(())
    }
}

impl CommitEditor for GitCommitEditor<'_> {
    fn add_file(&mut self, path: &str, content: &[u8]) -> RepositoryResult<()> {
        self.check_vacant(path)?;
        self.check_locks(path)?;
        let blob = self.state.repo.blob(content)?;
        self.staged.insert_file(path, blob);
        Ok(())
    }

    fn modify_file(&mut self, path: &str, base: Revision, content: &[u8]) -> RepositoryResult<()> {
        if self.staged.node_kind(path) != Some(NodeKind::File) {
            return Err(self.not_found(path));
        }
        self.check_current(path, base)?;
        self.check_locks(path)?;
        let blob = self.state.repo.blob(content)?;
        self.staged.insert_file(path, blob);
        Ok(())
    }

    fn delete(&mut self, path: &str, expected: Expected) -> RepositoryResult<()> {
        if path.is_empty() || !self.staged.contains(path) {
            return Err(self.not_found(path));
        }
        match expected {
            Expected::Any => {}
            Expected::Absent => return Err(RepositoryError::PathExists(path.to_string())),
            Expected::At(revision) => self.check_current(path, revision)?,
        }
        self.check_locks(path)?;
        self.staged.remove(path)
    }

    fn move_file(&mut self, from: &str, from_revision: Revision, to: &str) -> RepositoryResult<()> {
        self.move_node(NodeKind::File, from, from_revision, to)
    }

    fn move_dir(&mut self, from: &str, from_revision: Revision, to: &str) -> RepositoryResult<()> {
        self.move_node(NodeKind::Directory, from, from_revision, to)
    }

    fn close(self: Box<Self>) -> RepositoryResult<Revision> {
        let mut editor = *self;
        let parent = editor.state.revisions.head_commit();
        let tree_id = editor.staged.write(&editor.state.repo)?;
        let message = CommitMessage::format(&editor.message, &editor.copies)?;

        let commit = CommitBuilder::new(&editor.state.repo)
            .tree(tree_id)
            .parent(parent)
            .message(message)
            .signature(editor.signature.clone())
            .commit()?;
        RefManager::advance_main(&editor.state.repo, parent, commit)?;

        let revision = editor.state.revisions.push(commit);
        tracing::info!(
            revision = %revision,
            author = %editor.signature.name,
            commit = %commit.short(),
            "committed"
        );
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::error::RepositoryError;
    use crate::storage::operations::RepositoryOperations;
    use crate::storage::repository::GitRepository;
    use crate::storage::types::{Expected, GitSignature, NodeKind, Revision};
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitRepository) {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn create(repo: &GitRepository, path: &str, content: &[u8]) -> Revision {
        let mut editor = repo.open_editor("Create").unwrap();
        editor.add_file(path, content).unwrap();
        editor.close().unwrap()
    }

    #[test]
    fn test_add_existing_fails() {
        let (_dir, repo) = setup();
        create(&repo, "Page", b"p");

        let mut editor = repo.open_editor("Again").unwrap();
        assert!(matches!(
            editor.add_file("Page", b"q"),
            Err(RepositoryError::PathExists(_))
        ));
        assert!(matches!(
            editor.add_file("Page/child", b"q"),
            Err(RepositoryError::PathExists(_))
        ));
    }

    #[test]
    fn test_modify_requires_current_base() {
        let (_dir, repo) = setup();
        let created = create(&repo, "Page", b"v1");

        let mut editor = repo.open_editor("Edit").unwrap();
        editor.modify_file("Page", created, b"v2").unwrap();
        let edited = editor.close().unwrap();
        assert_eq!(edited, Revision::new(2));

        let mut editor = repo.open_editor("Stale edit").unwrap();
        let result = editor.modify_file("Page", created, b"v3");
        assert!(matches!(
            result,
            Err(RepositoryError::OutOfDate { actual, .. }) if actual == edited
        ));
        drop(editor);

        let mut editor = repo.open_editor("Missing").unwrap();
        assert!(matches!(
            editor.modify_file("Nope", created, b"x"),
            Err(RepositoryError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_dropped_editor_commits_nothing() {
        let (_dir, repo) = setup();
        {
            let mut editor = repo.open_editor("Abandoned").unwrap();
            editor.add_file("Page", b"p").unwrap();
        }
        assert_eq!(repo.latest_revision().unwrap(), Revision::ZERO);
        assert!(repo.entry("Page", Revision::ZERO).unwrap().is_none());
    }

    #[test]
    fn test_delete_expectations() {
        let (_dir, repo) = setup();
        let created = create(&repo, "Page", b"p");

        let mut editor = repo.open_editor("Delete").unwrap();
        assert!(matches!(
            editor.delete("Page", Expected::At(Revision::ZERO)),
            Err(RepositoryError::OutOfDate { .. })
        ));
        assert!(matches!(
            editor.delete("Other", Expected::Any),
            Err(RepositoryError::PathNotFound { .. })
        ));
        editor.delete("Page", Expected::At(created)).unwrap();
        let deleted = editor.close().unwrap();

        assert!(repo.entry("Page", deleted).unwrap().is_none());
        assert!(repo.entry("Page", created).unwrap().is_some());
    }

    #[test]
    fn test_move_directory_records_copy() {
        let (_dir, repo) = setup();
        let mut editor = repo.open_editor("Attach").unwrap();
        editor.add_file("Old-attachments/a.txt", b"a").unwrap();
        editor.add_file("Old-attachments/b.txt", b"b").unwrap();
        let attached = editor.close().unwrap();

        let mut editor = repo.open_editor("Move").unwrap();
        editor.move_dir("Old-attachments", attached, "New-attachments").unwrap();
        let moved = editor.close().unwrap();

        assert!(repo.entry("Old-attachments", moved).unwrap().is_none());
        let entry = repo.entry("New-attachments", moved).unwrap().unwrap();
        assert_eq!(entry.kind, NodeKind::Directory);
        assert_eq!(repo.read_file("New-attachments/b.txt", moved).unwrap(), b"b".to_vec());
    }

    #[test]
    fn test_move_stale_source_fails() {
        let (_dir, repo) = setup();
        let created = create(&repo, "A", b"a");
        let mut editor = repo.open_editor("Edit").unwrap();
        editor.modify_file("A", created, b"aa").unwrap();
        editor.close().unwrap();

        let mut editor = repo.open_editor("Move").unwrap();
        assert!(matches!(
            editor.move_file("A", created, "B"),
            Err(RepositoryError::OutOfDate { .. })
        ));
        assert!(matches!(
            editor.move_file("A", Revision::new(7), "B"),
            Err(RepositoryError::NoSuchRevision(_))
        ));
    }

    #[test]
    fn test_move_onto_existing_fails() {
        let (_dir, repo) = setup();
        create(&repo, "A", b"a");
        let both = create(&repo, "B", b"b");

        let mut editor = repo.open_editor("Move").unwrap();
        assert!(matches!(
            editor.move_file("A", both, "B"),
            Err(RepositoryError::PathExists(_))
        ));
    }

    #[test]
    fn test_locked_path_blocks_other_users() {
        let (_dir, repo) = setup();
        let created = create(&repo, "Page", b"p");
        let alice = repo.with_signature(GitSignature::new("alice", "alice@example.com"));
        let bob = repo.with_signature(GitSignature::new("bob", "bob@example.com"));
        alice.lock("Page", "mine").unwrap();

        let mut editor = bob.open_editor("Edit").unwrap();
        assert!(matches!(
            editor.modify_file("Page", created, b"q"),
            Err(RepositoryError::Locked { .. })
        ));
        drop(editor);

        let mut editor = alice.open_editor("Edit").unwrap();
        editor.modify_file("Page", created, b"q").unwrap();
        editor.close().unwrap();
    }
}
