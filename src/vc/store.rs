//! The versioned page store.
//!
//! Pages are files at the repository root named after the page. A page's
//! attachments are the files under `<page>-attachments/`. Every mutation is
//! one [`CommitAction`]; reads go straight to the repository at a revision.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;

use crate::storage::{
    Expected, LockInfo, LogQuery, NodeKind, PathAction, RepositoryError, RepositoryOperations,
    Revision,
};
use crate::vc::action::{CommitAction, PathOperation};
use crate::vc::error::{PageStoreError, PageStoreResult};
use crate::vc::history;
use crate::vc::tracker::{DeletedRevisionTracker, InMemoryDeletedRevisionTracker};
use crate::vc::types::{
    AttachmentHistory, ChangeInfo, ChangeType, PageReference, StoreKind, VersionedPageInfo,
};

/// Everything a wiki needs from its page storage.
pub trait PageStore: Send + Sync {
    /// the name of the wiki this store serves
    fn wiki_name(&self) -> &str;

    fn latest_revision(&self) -> PageStoreResult<Revision>;

    /// The page as of `revision`, or head when `None`.
    ///
    /// At head a page that does not exist comes back as a new page
    /// placeholder; at an explicit revision it is [`PageStoreError::NotFound`].
    fn get(&self, page: &PageReference, revision: Option<Revision>) -> PageStoreResult<VersionedPageInfo>;

    /// Write the page.
    ///
    /// `Absent` creates it, `At(r)` replaces it only if it last changed in
    /// `r`, `Any` creates or replaces. A stale expectation is a
    /// [`PageStoreError::Conflict`] and changes nothing.
    fn set(&self, page: &PageReference, expected: Expected, content: &str, message: &str) -> PageStoreResult<Revision>;

    fn delete(&self, page: &PageReference, expected: Expected, message: &str) -> PageStoreResult<Revision>;

    /// every attachment the page has ever had, by name
    fn attachments(&self, page: &PageReference) -> PageStoreResult<Vec<AttachmentHistory>>;

    fn attach(
        &self,
        page: &PageReference,
        name: &str,
        expected: Expected,
        content: &[u8],
        message: &str,
    ) -> PageStoreResult<Revision>;

    fn attachment(&self, page: &PageReference, name: &str, revision: Option<Revision>) -> PageStoreResult<Vec<u8>>;

    fn delete_attachment(
        &self,
        page: &PageReference,
        name: &str,
        expected: Expected,
        message: &str,
    ) -> PageStoreResult<Revision>;

    /// Move a page, and optionally its attachments, in one commit.
    ///
    /// Any failure is a [`PageStoreError::Rename`] and nothing moves.
    fn rename(
        &self,
        from: &PageReference,
        to: &PageReference,
        move_attachments: bool,
        expected: Expected,
        message: &str,
    ) -> PageStoreResult<Revision>;

    /// the page's lineage newest first, through renames, stopping at the
    /// last deletion
    fn history(&self, page: &PageReference) -> PageStoreResult<Vec<ChangeInfo>>;

    /// Pages with any change, to the page or its attachments, in
    /// `from..=to`.
    fn changed_between(&self, from: Revision, to: Revision) -> PageStoreResult<BTreeSet<PageReference>>;

    /// all pages at head
    fn list(&self) -> PageStoreResult<Vec<PageReference>>;

    /// the newest changes across the whole wiki
    fn recent_changes(&self, limit: usize) -> PageStoreResult<Vec<ChangeInfo>>;

    /// Take the editing lock on a page. `None` if someone else holds it.
    fn try_to_lock(&self, page: &PageReference) -> PageStoreResult<Option<LockInfo>>;

    fn unlock(&self, page: &PageReference, token: &str) -> PageStoreResult<()>;
}

/// [`PageStore`] over a [`RepositoryOperations`] capability.
///
/// Cheap to share: clone the `Arc` it lives in.
pub struct VersionedPageStore {
    wiki: String,
    ops: Arc<dyn RepositoryOperations>,
    tracker: Arc<dyn DeletedRevisionTracker>,
}

impl VersionedPageStore {
    /// a store with an in-memory deletion tracker
    pub fn new(wiki: impl Into<String>, ops: Arc<dyn RepositoryOperations>) -> Self {
        let tracker = Arc::new(InMemoryDeletedRevisionTracker::new(Arc::clone(&ops)));
        Self::with_tracker(wiki, ops, tracker)
    }

    pub fn with_tracker(
        wiki: impl Into<String>,
        ops: Arc<dyn RepositoryOperations>,
        tracker: Arc<dyn DeletedRevisionTracker>,
    ) -> Self {
        Self {
            wiki: wiki.into(),
            ops,
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<dyn DeletedRevisionTracker> {
        &self.tracker
    }

    fn commit(&self, action: CommitAction) -> PageStoreResult<Revision> {
        action
            .execute(&*self.ops)
            .map_err(|err| PageStoreError::from(err.into_repository_error()))
    }

    /// add or replace one file, honouring the caller's expectation
    fn write_file(&self, path: &str, expected: Expected, content: &[u8], message: &str) -> PageStoreResult<Revision> {
        let operation = match expected {
            Expected::Absent => PathOperation::AddFile {
                path: path.to_string(),
                content: content.to_vec(),
            },
            Expected::At(base) => PathOperation::ModifyFile {
                path: path.to_string(),
                base,
                content: content.to_vec(),
            },
            Expected::Any => {
                let head = self.ops.latest_revision()?;
                match self.ops.entry(path, head)? {
                    Some(entry) if entry.kind == NodeKind::File => PathOperation::ModifyFile {
                        path: path.to_string(),
                        base: entry.last_changed,
                        content: content.to_vec(),
                    },
                    _ => PathOperation::AddFile {
                        path: path.to_string(),
                        content: content.to_vec(),
                    },
                }
            }
        };

        let action = CommitAction::new(message).with(operation);
        action
            .execute(&*self.ops)
            .map_err(|err| match err.into_repository_error() {
                // replacing a page that is gone is as stale as replacing an old version
                source @ RepositoryError::PathNotFound { .. } => PageStoreError::Conflict {
                    path: path.to_string(),
                    source,
                },
                other => PageStoreError::from(other),
            })
    }

    fn delete_path(&self, path: &str, expected: Expected, message: &str) -> PageStoreResult<Revision> {
        let action = CommitAction::new(message).with(PathOperation::Delete {
            path: path.to_string(),
            expected,
        });
        let revision = self.commit(action)?;

        let (page, kind) = StoreKind::classify(path);
        self.tracker.record_deletion(ChangeInfo {
            path: path.to_string(),
            page: page.to_string(),
            author: self.ops.user().to_string(),
            timestamp: Utc::now(),
            revision,
            message: message.to_string(),
            kind,
            change_type: ChangeType::Deleted,
        });
        tracing::info!(path, revision = %revision, "deleted");
        Ok(revision)
    }

    fn resolve(&self, revision: Option<Revision>) -> PageStoreResult<Revision> {
        match revision {
            Some(revision) => Ok(revision),
            None => self.ops.latest_revision().map_err(Into::into),
        }
    }
}

impl PageStore for VersionedPageStore {
    fn wiki_name(&self) -> &str {
        &self.wiki
    }

    fn latest_revision(&self) -> PageStoreResult<Revision> {
        Ok(self.ops.latest_revision()?)
    }

    fn get(&self, page: &PageReference, revision: Option<Revision>) -> PageStoreResult<VersionedPageInfo> {
        let at = self.resolve(revision)?;
        let entry = match self.ops.entry(page.path(), at)? {
            Some(entry) if entry.kind == NodeKind::File => entry,
            _ if revision.is_none() => return Ok(VersionedPageInfo::new_page(&self.wiki, page.clone())),
            _ => {
                return Err(PageStoreError::NotFound {
                    path: page.path().to_string(),
                    revision: Some(at),
                })
            }
        };

        let bytes = self.ops.read_file(page.path(), at)?;
        let content = String::from_utf8(bytes).map_err(|err| PageStoreError::InvalidContent {
            path: page.path().to_string(),
            reason: err.to_string(),
        })?;
        let locked_by = self.ops.lock_info(page.path())?.map(|lock| lock.owner);

        Ok(VersionedPageInfo {
            wiki: self.wiki.clone(),
            page: page.clone(),
            content,
            revision: Some(entry.last_changed),
            author: Some(entry.author),
            timestamp: Some(entry.timestamp),
            locked_by,
        })
    }

    fn set(&self, page: &PageReference, expected: Expected, content: &str, message: &str) -> PageStoreResult<Revision> {
        let revision = self.write_file(page.path(), expected, content.as_bytes(), message)?;
        tracing::debug!(page = %page, revision = %revision, "saved");
        Ok(revision)
    }

    fn delete(&self, page: &PageReference, expected: Expected, message: &str) -> PageStoreResult<Revision> {
        self.delete_path(page.path(), expected, message)
    }

    fn attachments(&self, page: &PageReference) -> PageStoreResult<Vec<AttachmentHistory>> {
        let head = self.ops.latest_revision()?;
        let directory = page.attachments_path();

        let current: BTreeSet<String> = self
            .ops
            .list_dir(&directory, head)?
            .into_iter()
            .filter(|entry| entry.kind == NodeKind::File)
            .map(|entry| entry.name().to_string())
            .collect();

        // names ever attached, including deleted ones, back to the deletion
        // that ended an earlier page of the same name
        let prefix = format!("{}/", directory);
        let mut attached = Vec::new();
        let mut born = false;
        let mut boundary = None;
        for entry in self.ops.log(&LogQuery::descendants(""))? {
            if boundary.is_some_and(|revision| entry.revision < revision) {
                break;
            }
            if entry.path == page.path() {
                match entry.action {
                    PathAction::Added { .. } => born = true,
                    PathAction::Deleted if born && boundary.is_none() => boundary = Some(entry.revision),
                    _ => {}
                }
            }
            if let Some(name) = entry.path.strip_prefix(&prefix) {
                if !name.contains('/') {
                    attached.push((name.to_string(), entry.revision));
                }
            }
        }
        let mut names = current.clone();
        names.extend(
            attached
                .into_iter()
                .filter(|(_, revision)| boundary.map_or(true, |boundary| *revision > boundary))
                .map(|(name, _)| name),
        );

        let mut histories = BTreeMap::new();
        for name in names {
            let path = format!("{}{}", prefix, name);
            let versions = history::history(&*self.ops, &*self.tracker, &path)?;
            let deleted = !current.contains(&name);
            histories.insert(name.clone(), AttachmentHistory { name, versions, deleted });
        }
        Ok(histories.into_values().collect())
    }

    fn attach(
        &self,
        page: &PageReference,
        name: &str,
        expected: Expected,
        content: &[u8],
        message: &str,
    ) -> PageStoreResult<Revision> {
        let path = page.attachment_path(name)?;
        let revision = self.write_file(&path, expected, content, message)?;
        tracing::debug!(page = %page, attachment = name, revision = %revision, "attached");
        Ok(revision)
    }

    fn attachment(&self, page: &PageReference, name: &str, revision: Option<Revision>) -> PageStoreResult<Vec<u8>> {
        let path = page.attachment_path(name)?;
        let at = self.resolve(revision)?;
        Ok(self.ops.read_file(&path, at)?)
    }

    fn delete_attachment(
        &self,
        page: &PageReference,
        name: &str,
        expected: Expected,
        message: &str,
    ) -> PageStoreResult<Revision> {
        let path = page.attachment_path(name)?;
        self.delete_path(&path, expected, message)
    }

    fn rename(
        &self,
        from: &PageReference,
        to: &PageReference,
        move_attachments: bool,
        expected: Expected,
        message: &str,
    ) -> PageStoreResult<Revision> {
        let rename_error = |source| PageStoreError::Rename {
            from: from.to_string(),
            to: to.to_string(),
            source,
        };

        let head = self.ops.latest_revision()?;
        let from_revision = match expected {
            Expected::At(revision) => revision,
            Expected::Any => head,
            Expected::Absent => return Err(rename_error(RepositoryError::PathExists(from.to_string()))),
        };

        let mut action = CommitAction::new(message).with(PathOperation::Move {
            node: NodeKind::File,
            from: from.path().to_string(),
            from_revision,
            to: to.path().to_string(),
        });
        if move_attachments && self.ops.entry(&from.attachments_path(), head)?.is_some() {
            action = action.with(PathOperation::Move {
                node: NodeKind::Directory,
                from: from.attachments_path(),
                from_revision: head,
                to: to.attachments_path(),
            });
        }

        let revision = action
            .execute(&*self.ops)
            .map_err(|err| rename_error(err.into_repository_error()))?;

        self.tracker.record_deletion(ChangeInfo {
            path: from.path().to_string(),
            page: from.name().to_string(),
            author: self.ops.user().to_string(),
            timestamp: Utc::now(),
            revision,
            message: message.to_string(),
            kind: StoreKind::Page,
            change_type: ChangeType::Deleted,
        });
        tracing::info!(from = %from, to = %to, revision = %revision, "renamed");
        Ok(revision)
    }

    fn history(&self, page: &PageReference) -> PageStoreResult<Vec<ChangeInfo>> {
        history::history(&*self.ops, &*self.tracker, page.path())
    }

    fn changed_between(&self, from: Revision, to: Revision) -> PageStoreResult<BTreeSet<PageReference>> {
        if from > to {
            return Ok(BTreeSet::new());
        }
        let query = LogQuery::descendants("").from(from).to(to);
        let pages = self
            .ops
            .log(&query)?
            .into_iter()
            .filter_map(|entry| ChangeInfo::from(entry).page_reference())
            .collect();
        Ok(pages)
    }

    fn list(&self) -> PageStoreResult<Vec<PageReference>> {
        let head = self.ops.latest_revision()?;
        let pages = self
            .ops
            .list_dir("", head)?
            .into_iter()
            .filter(|entry| entry.kind == NodeKind::File)
            .filter_map(|entry| PageReference::new(entry.name()).ok())
            .collect();
        Ok(pages)
    }

    fn recent_changes(&self, limit: usize) -> PageStoreResult<Vec<ChangeInfo>> {
        let query = LogQuery::descendants("").limit(limit);
        Ok(self.ops.log(&query)?.into_iter().map(ChangeInfo::from).collect())
    }

    fn try_to_lock(&self, page: &PageReference) -> PageStoreResult<Option<LockInfo>> {
        let comment = format!("editing {}", page);
        match self.ops.lock(page.path(), &comment) {
            Ok(lock) => Ok(Some(lock)),
            Err(RepositoryError::Locked { owner, .. }) => {
                tracing::debug!(page = %page, owner = %owner, "already locked");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn unlock(&self, page: &PageReference, token: &str) -> PageStoreResult<()> {
        Ok(self.ops.unlock(page.path(), token)?)
    }
}
