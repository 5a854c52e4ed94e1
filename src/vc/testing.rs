//! scripted stand-ins for the repository and the deletion tracker

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use crate::storage::{
    CommitEditor, DirEntry, Expected, LockInfo, LogEntry, LogQuery, NodeKind, PathAction, RepositoryError,
    RepositoryOperations, RepositoryResult, Revision,
};
use crate::vc::error::PageStoreResult;
use crate::vc::tracker::DeletedRevisionTracker;
use crate::vc::types::ChangeInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EditorCall {
    Open(String),
    AddFile(String),
    ModifyFile(String, Revision),
    Delete(String, Expected),
    MoveFile(String, Revision, String),
    MoveDir(String, Revision, String),
    Close,
}

/// Answers log queries from a script and records every editor call.
pub(crate) struct ScriptedRepository {
    head: Mutex<Revision>,
    calls: Mutex<Vec<EditorCall>>,
    queries: Mutex<Vec<LogQuery>>,
    failures: Mutex<HashMap<String, RepositoryError>>,
    logs: Vec<(String, Revision, Vec<LogEntry>)>,
    entries: HashMap<String, NodeKind>,
}

impl ScriptedRepository {
    pub(crate) fn new(head: Revision) -> Self {
        Self {
            head: Mutex::new(head),
            calls: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            logs: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// the log returned for `path` queried up to `to`
    pub(crate) fn with_log(mut self, path: &str, to: Revision, entries: Vec<LogEntry>) -> Self {
        self.logs.push((path.to_string(), to, entries));
        self
    }

    /// a node that exists at every revision
    pub(crate) fn with_entry(mut self, path: &str, kind: NodeKind) -> Self {
        self.entries.insert(path.to_string(), kind);
        self
    }

    /// the first editor call on `path` fails with `err`
    pub(crate) fn fail_on(self, path: &str, err: RepositoryError) -> Self {
        self.failures.lock().insert(path.to_string(), err);
        self
    }

    pub(crate) fn calls(&self) -> Vec<EditorCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn queries(&self) -> Vec<LogQuery> {
        self.queries.lock().clone()
    }

    fn record(&self, call: EditorCall, path: &str) -> RepositoryResult<()> {
        self.calls.lock().push(call);
        match self.failures.lock().remove(path) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub(crate) fn log_entry(path: &str, revision: u64, action: PathAction) -> LogEntry {
    LogEntry {
        path: path.to_string(),
        revision: Revision::new(revision),
        author: "alice".to_string(),
        timestamp: Utc.timestamp_opt(1_700_000_000 + revision as i64, 0).unwrap(),
        message: format!("change {}", revision),
        action,
    }
}

impl RepositoryOperations for ScriptedRepository {
    fn user(&self) -> &str {
        "alice"
    }

    fn latest_revision(&self) -> RepositoryResult<Revision> {
        Ok(*self.head.lock())
    }

    fn log(&self, query: &LogQuery) -> RepositoryResult<Vec<LogEntry>> {
        self.queries.lock().push(query.clone());
        let to = query.to.unwrap_or(*self.head.lock());
        Ok(self
            .logs
            .iter()
            .find(|(path, bound, _)| *path == query.path && *bound == to)
            .map(|(_, _, entries)| entries.clone())
            .unwrap_or_default())
    }

    fn entry(&self, path: &str, revision: Revision) -> RepositoryResult<Option<DirEntry>> {
        Ok(self.entries.get(path).map(|kind| DirEntry {
            path: path.to_string(),
            kind: *kind,
            size: 0,
            last_changed: revision,
            author: "alice".to_string(),
            timestamp: Utc::now(),
        }))
    }

    fn read_file(&self, path: &str, revision: Revision) -> RepositoryResult<Vec<u8>> {
        match self.entries.get(path) {
            Some(NodeKind::File) => Ok(Vec::new()),
            _ => Err(RepositoryError::PathNotFound {
                path: path.to_string(),
                revision,
            }),
        }
    }

    fn list_dir(&self, _path: &str, _revision: Revision) -> RepositoryResult<Vec<DirEntry>> {
        Ok(Vec::new())
    }

    fn open_editor(&self, message: &str) -> RepositoryResult<Box<dyn CommitEditor + '_>> {
        self.calls.lock().push(EditorCall::Open(message.to_string()));
        Ok(Box::new(ScriptedEditor { repo: self }))
    }

    fn lock(&self, path: &str, comment: &str) -> RepositoryResult<LockInfo> {
        Ok(LockInfo {
            path: path.to_string(),
            owner: "alice".to_string(),
            token: "token".to_string(),
            comment: comment.to_string(),
            created: Utc::now(),
        })
    }

    fn unlock(&self, _path: &str, _token: &str) -> RepositoryResult<()> {
        Ok(())
    }

    fn lock_info(&self, _path: &str) -> RepositoryResult<Option<LockInfo>> {
        Ok(None)
    }
}

struct ScriptedEditor<'a> {
    repo: &'a ScriptedRepository,
}

impl CommitEditor for ScriptedEditor<'_> {
    fn add_file(&mut self, path: &str, _content: &[u8]) -> RepositoryResult<()> {
        self.repo.record(EditorCall::AddFile(path.to_string()), path)
    }

    fn modify_file(&mut self, path: &str, base: Revision, _content: &[u8]) -> RepositoryResult<()> {
        self.repo.record(EditorCall::ModifyFile(path.to_string(), base), path)
    }

    fn delete(&mut self, path: &str, expected: Expected) -> RepositoryResult<()> {
        self.repo.record(EditorCall::Delete(path.to_string(), expected), path)
    }

    fn move_file(&mut self, from: &str, from_revision: Revision, to: &str) -> RepositoryResult<()> {
        self.repo.record(
            EditorCall::MoveFile(from.to_string(), from_revision, to.to_string()),
            from,
        )
    }

    fn move_dir(&mut self, from: &str, from_revision: Revision, to: &str) -> RepositoryResult<()> {
        self.repo.record(
            EditorCall::MoveDir(from.to_string(), from_revision, to.to_string()),
            from,
        )
    }

    fn close(self: Box<Self>) -> RepositoryResult<Revision> {
        self.repo.calls.lock().push(EditorCall::Close);
        let mut head = self.repo.head.lock();
        *head = head.next();
        Ok(*head)
    }
}

/// A tracker that knows only the deletions it was given.
#[derive(Default)]
pub(crate) struct FixedTracker {
    deletions: Mutex<HashMap<String, ChangeInfo>>,
}

impl DeletedRevisionTracker for FixedTracker {
    fn change_that_deleted(&self, path: &str) -> PageStoreResult<Option<ChangeInfo>> {
        Ok(self.deletions.lock().get(path).cloned())
    }

    fn record_deletion(&self, change: ChangeInfo) {
        self.deletions.lock().insert(change.path.clone(), change);
    }

    fn rebuild(&self) -> PageStoreResult<()> {
        Ok(())
    }
}
