//! core type-safe wrappers around git primitives and repository vocabulary.

use std::fmt;

use chrono::{DateTime, Utc};
use git2::Oid;
use serde::{Deserialize, Serialize};

/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected. The inner Oid is only accessible within the storage module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A global revision number.
///
/// Revision 0 is the empty initial state; every commit afterwards gets the
/// next number. Only the repository hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(u64);

impl Revision {
    /// the empty initial revision
    pub const ZERO: Revision = Revision(0);

    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// the revision before this one, if any
    pub fn prev(self) -> Option<Revision> {
        self.0.checked_sub(1).map(Revision)
    }

    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl From<u64> for Revision {
    fn from(number: u64) -> Self {
        Self(number)
    }
}

/// What kind of node a path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
}

/// Optimistic-concurrency precondition on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expected {
    /// no check at all
    Any,
    /// the path must not exist
    Absent,
    /// the path must exist and have last changed in exactly this revision
    At(Revision),
}

impl Expected {
    /// the revision pinned by this precondition, if any
    pub fn revision(&self) -> Option<Revision> {
        match self {
            Expected::At(revision) => Some(*revision),
            Expected::Any | Expected::Absent => None,
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Any => write!(f, "any"),
            Expected::Absent => write!(f, "absent"),
            Expected::At(revision) => write!(f, "{}", revision),
        }
    }
}

/// where a copied path came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopySource {
    pub path: String,
    pub revision: Revision,
}

impl CopySource {
    pub fn new(path: impl Into<String>, revision: Revision) -> Self {
        Self {
            path: path.into(),
            revision,
        }
    }
}

impl fmt::Display for CopySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.revision.get())
    }
}

/// what a single commit did to a single path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathAction {
    Added { copied_from: Option<CopySource> },
    Modified,
    Deleted,
}

/// one changed path of one revision, as reported by a log query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub path: String,
    pub revision: Revision,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub action: PathAction,
}

/// which changed paths a log query reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFilter {
    /// the path itself, plus the removal of its copy source in the revision
    /// that copied it
    PathOnly,
    /// the path and everything beneath it
    Descendants,
}

/// A path-scoped log query.
///
/// Entries come back newest first. `to` defaults to the head revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub path: String,
    pub limit: Option<usize>,
    pub filter: LogFilter,
    pub stop_on_copy: bool,
    pub from: Revision,
    pub to: Option<Revision>,
}

impl LogQuery {
    /// log of a single path from revision 0 to head, stopping at copies
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            limit: None,
            filter: LogFilter::PathOnly,
            stop_on_copy: true,
            from: Revision::ZERO,
            to: None,
        }
    }

    /// log of a path and all its descendants
    pub fn descendants(path: impl Into<String>) -> Self {
        Self {
            filter: LogFilter::Descendants,
            stop_on_copy: false,
            ..Self::path(path)
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn stop_on_copy(mut self, value: bool) -> Self {
        self.stop_on_copy = value;
        self
    }

    pub fn from(mut self, revision: Revision) -> Self {
        self.from = revision;
        self
    }

    pub fn to(mut self, revision: Revision) -> Self {
        self.to = Some(revision);
        self
    }

    /// check whether a changed path falls inside this query
    pub fn matches(&self, changed: &str) -> bool {
        match self.filter {
            LogFilter::PathOnly => changed == self.path,
            LogFilter::Descendants => is_same_or_descendant(&self.path, changed),
        }
    }
}

/// `""` is the root and contains everything.
pub fn is_same_or_descendant(ancestor: &str, path: &str) -> bool {
    if ancestor.is_empty() || ancestor == path {
        return true;
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// a path as it exists in some revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: String,
    pub kind: NodeKind,
    pub size: u64,
    pub last_changed: Revision,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

impl DirEntry {
    /// the last path component
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// an advisory lock held on a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub path: String,
    pub owner: String,
    pub token: String,
    pub comment: String,
    pub created: DateTime<Utc>,
}

/// git signature (author/committer info)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    /// create a new signature
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// default signature for commits nobody signed
    pub fn revwiki() -> Self {
        Self::new("revwiki", "revwiki@localhost")
    }

    /// convert to git2::Signature
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::revwiki()
    }
}
