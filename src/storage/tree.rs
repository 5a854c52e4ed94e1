//!  tree operations for wiki paths.
//!
//! in Git, a tree is a directory. In revwiki:
//! - the root tree contains one blob per page
//! - each `<page>-attachments` directory contains that page's attachments
//!
//! Reading goes through [`TreeHandle`]. Writing goes through [`StagedTree`],
//! which flattens a tree into `path -> blob` entries, applies edits, and
//! rebuilds the nested git trees when written. Git has no empty directories,
//! so a directory exists exactly as long as it has a file beneath it.

use std::collections::BTreeMap;
use std::path::Path;

use git2::{FileMode, ObjectType, Repository, Tree, TreeWalkMode, TreeWalkResult};

use crate::storage::error::{RepositoryError, RepositoryResult};
use crate::storage::types::{is_same_or_descendant, NodeKind, TreeId};

/// A read only handle to a git tree at a specific commit
///
/// think of it as a snapshot - it won't change even if new commits are made.
#[derive(Debug)]
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    /// create a TreeHandle from a git2::Tree
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    /// what the path names in this tree, if anything. `""` is the root.
    pub fn node_kind(&self, path: &str) -> Option<NodeKind> {
        if path.is_empty() {
            return Some(NodeKind::Directory);
        }
        let entry = self.tree.get_path(Path::new(path)).ok()?;
        match entry.kind() {
            Some(ObjectType::Blob) => Some(NodeKind::File),
            Some(ObjectType::Tree) => Some(NodeKind::Directory),
            _ => None,
        }
    }

    /// read the content of a file
    pub fn read_file(&self, repo: &Repository, path: &str) -> RepositoryResult<Option<Vec<u8>>> {
        if self.node_kind(path) != Some(NodeKind::File) {
            return Ok(None);
        }
        let entry = self.tree.get_path(Path::new(path))?;
        let blob = repo.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }

    /// size in bytes of a file, 0 for directories
    pub fn size(&self, repo: &Repository, path: &str) -> RepositoryResult<u64> {
        if self.node_kind(path) != Some(NodeKind::File) {
            return Ok(0);
        }
        let entry = self.tree.get_path(Path::new(path))?;
        let blob = repo.find_blob(entry.id())?;
        Ok(blob.size() as u64)
    }

    /// list the immediate children of a directory, as full paths
    pub fn list_dir(&self, repo: &Repository, path: &str) -> RepositoryResult<Option<Vec<String>>> {
        let subtree = if path.is_empty() {
            repo.find_tree(self.tree.id())?
        } else {
            match self.tree.get_path(Path::new(path)) {
                Ok(entry) if entry.kind() == Some(ObjectType::Tree) => repo.find_tree(entry.id())?,
                _ => return Ok(None),
            }
        };

        let children = subtree
            .iter()
            .filter_map(|entry| entry.name().map(|name| join(path, name)))
            .collect();
        Ok(Some(children))
    }

    /// every file in the tree, flattened to `path -> (blob, mode)`
    pub fn flatten(&self) -> RepositoryResult<BTreeMap<String, (git2::Oid, i32)>> {
        let mut files = BTreeMap::new();
        self.tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.insert(format!("{}{}", root, name), (entry.id(), entry.filemode()));
                }
            }
            TreeWalkResult::Ok
        })?;
        Ok(files)
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// a mutable, flattened copy of a tree
///
/// this adds up changes and produces a new tree when written.
/// the original tree is not modified
///
/// # Usage Pattern
///
/// ```ignore
/// let mut staged = StagedTree::from_tree(&tree)?;
/// staged.insert_file("FrontPage", blob_id);
/// staged.remove("OldPage")?;
/// let new_tree_id = staged.write(repo)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct StagedTree {
    files: BTreeMap<String, (git2::Oid, i32)>,
}

impl StagedTree {
    /// create a StagedTree holding everything in an existing tree
    pub fn from_tree(tree: &TreeHandle<'_>) -> RepositoryResult<Self> {
        Ok(Self {
            files: tree.flatten()?,
        })
    }

    /// what the path names in the staged state
    pub fn node_kind(&self, path: &str) -> Option<NodeKind> {
        if path.is_empty() {
            return Some(NodeKind::Directory);
        }
        if self.files.contains_key(path) {
            return Some(NodeKind::File);
        }
        let prefix = format!("{}/", path);
        self.files
            .range(prefix.clone()..)
            .next()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|_| NodeKind::Directory)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.node_kind(path).is_some()
    }

    /// add or replace a file
    pub fn insert_file(&mut self, path: &str, blob: git2::Oid) {
        self.files.insert(path.to_string(), (blob, FileMode::Blob.into()));
    }

    /// remove a file or a whole directory
    pub fn remove(&mut self, path: &str) -> RepositoryResult<()> {
        let doomed: Vec<String> = self
            .files
            .keys()
            .filter(|key| is_same_or_descendant(path, key))
            .cloned()
            .collect();

        if doomed.is_empty() || path.is_empty() {
            return Err(RepositoryError::Internal(format!(
                "cannot remove '{}' from staged tree",
                path
            )));
        }
        for key in doomed {
            self.files.remove(&key);
        }
        Ok(())
    }

    /// graft `from` (as it is in `source`) into this tree at `to`
    pub fn copy_from(&mut self, source: &TreeHandle<'_>, from: &str, to: &str) -> RepositoryResult<usize> {
        let mut copied = 0;
        for (path, entry) in source.flatten()? {
            if !is_same_or_descendant(from, &path) {
                continue;
            }
            let rest = &path[from.len()..];
            self.files.insert(format!("{}{}", to, rest), entry);
            copied += 1;
        }
        Ok(copied)
    }

    /// write all changes and return the new root tree ID
    ///
    /// this is where the nesting comes back - directories are rebuilt bottom up
    pub fn write(&self, repo: &Repository) -> RepositoryResult<TreeId> {
        let mut root = Node::default();
        for (path, (oid, mode)) in &self.files {
            root.insert(path.split('/').collect::<Vec<_>>().as_slice(), *oid, *mode);
        }
        Ok(TreeId::new(root.write(repo)?))
    }
}

#[derive(Default)]
struct Node {
    files: BTreeMap<String, (git2::Oid, i32)>,
    dirs: BTreeMap<String, Node>,
}

impl Node {
    fn insert(&mut self, components: &[&str], oid: git2::Oid, mode: i32) {
        match components {
            [] => {}
            [name] => {
                self.files.insert(name.to_string(), (oid, mode));
            }
            [dir, rest @ ..] => self
                .dirs
                .entry(dir.to_string())
                .or_default()
                .insert(rest, oid, mode),
        }
    }

    fn write(&self, repo: &Repository) -> RepositoryResult<git2::Oid> {
        let mut builder = repo.treebuilder(None)?;
        for (name, (oid, mode)) in &self.files {
            builder.insert(name, *oid, *mode)?;
        }
        for (name, node) in &self.dirs {
            let subtree = node.write(repo)?;
            builder.insert(name, subtree, FileMode::Tree.into())?;
        }
        Ok(builder.write()?)
    }
}

/// helper function to create an initial empty tree
pub fn create_initial_tree(repo: &Repository) -> RepositoryResult<TreeId> {
    StagedTree::default().write(repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn handle(repo: &Repository, id: TreeId) -> TreeHandle<'_> {
        TreeHandle::new(repo.find_tree(id.raw()).unwrap())
    }

    #[test]
    fn test_empty_tree() {
        let (_dir, repo) = setup_repo();
        let tree_id = create_initial_tree(&repo).unwrap();
        let tree = handle(&repo, tree_id);

        assert!(tree.flatten().unwrap().is_empty());
        assert_eq!(tree.node_kind(""), Some(NodeKind::Directory));
        assert_eq!(tree.node_kind("FrontPage"), None);
    }

    #[test]
    fn test_nested_write_and_read() {
        let (_dir, repo) = setup_repo();
        let page = repo.blob(b"Hello").unwrap();
        let picture = repo.blob(b"\x89PNG").unwrap();

        let mut staged = StagedTree::default();
        staged.insert_file("FrontPage", page);
        staged.insert_file("FrontPage-attachments/logo.png", picture);
        let tree_id = staged.write(&repo).unwrap();

        let tree = handle(&repo, tree_id);
        assert_eq!(tree.node_kind("FrontPage"), Some(NodeKind::File));
        assert_eq!(tree.node_kind("FrontPage-attachments"), Some(NodeKind::Directory));
        assert_eq!(
            tree.read_file(&repo, "FrontPage").unwrap(),
            Some(b"Hello".to_vec())
        );
        assert_eq!(tree.size(&repo, "FrontPage-attachments/logo.png").unwrap(), 4);

        let children = tree.list_dir(&repo, "FrontPage-attachments").unwrap().unwrap();
        assert_eq!(children, vec!["FrontPage-attachments/logo.png".to_string()]);
        assert!(tree.list_dir(&repo, "Missing").unwrap().is_none());
    }

    #[test]
    fn test_remove_directory_removes_children() {
        let (_dir, repo) = setup_repo();
        let blob = repo.blob(b"x").unwrap();

        let mut staged = StagedTree::default();
        staged.insert_file("Page-attachments/a.txt", blob);
        staged.insert_file("Page-attachments/b.txt", blob);
        staged.insert_file("Page", blob);

        staged.remove("Page-attachments").unwrap();
        assert!(!staged.contains("Page-attachments"));
        assert!(staged.contains("Page"));
        assert!(staged.remove("Page-attachments").is_err());
    }

    #[test]
    fn test_copy_directory() {
        let (_dir, repo) = setup_repo();
        let blob = repo.blob(b"x").unwrap();

        let mut staged = StagedTree::default();
        staged.insert_file("Old-attachments/a.txt", blob);
        staged.insert_file("Old", blob);
        let source = handle(&repo, staged.write(&repo).unwrap());

        let copied = staged.copy_from(&source, "Old-attachments", "New-attachments").unwrap();
        assert_eq!(copied, 1);
        assert_eq!(staged.node_kind("New-attachments/a.txt"), Some(NodeKind::File));
        // "Old" is not under "Old-attachments" even though it is a string prefix
        assert_eq!(staged.node_kind("New"), None);
    }
}
