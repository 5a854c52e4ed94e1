//! Which paths are currently deleted, and by which change.
//!
//! The tracker is a cache derived from repository history. It never decides
//! anything the repository could not rebuild: [`DeletedRevisionTracker::rebuild`]
//! throws it away and rescans, and [`DeletedRevisionTracker::record_deletion`]
//! lets the store publish a delete before the next scan sees it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::storage::{LogQuery, RepositoryOperations, Revision};
use crate::vc::error::PageStoreResult;
use crate::vc::types::{ChangeInfo, ChangeType};

/// path -> the change that deleted it, for paths whose latest change is a
/// deletion
pub trait DeletedRevisionTracker: Send + Sync {
    fn change_that_deleted(&self, path: &str) -> PageStoreResult<Option<ChangeInfo>>;

    /// note a deletion committed through the store
    fn record_deletion(&self, change: ChangeInfo);

    /// forget everything and rescan from revision 1
    fn rebuild(&self) -> PageStoreResult<()>;
}

/// A tracker held in memory.
///
/// The first query scans the whole history once; every later query only
/// scans the revisions committed since.
pub struct InMemoryDeletedRevisionTracker {
    ops: Arc<dyn RepositoryOperations>,
    state: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    deletions: HashMap<String, ChangeInfo>,
    scanned_to: Option<Revision>,
}

impl TrackerState {
    fn apply(&mut self, change: ChangeInfo) {
        match change.change_type {
            ChangeType::Deleted => {
                self.deletions.insert(change.path.clone(), change);
            }
            ChangeType::Added { .. } | ChangeType::Modified => {
                self.deletions.remove(&change.path);
            }
        }
    }
}

impl InMemoryDeletedRevisionTracker {
    pub fn new(ops: Arc<dyn RepositoryOperations>) -> Self {
        Self {
            ops,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// how far history has been scanned
    pub fn scanned_to(&self) -> Option<Revision> {
        self.state.lock().scanned_to
    }

    fn catch_up(&self, state: &mut TrackerState) -> PageStoreResult<()> {
        let head = self.ops.latest_revision()?;
        let from = match state.scanned_to {
            Some(scanned) if scanned >= head => return Ok(()),
            Some(scanned) => scanned.next(),
            None => Revision::new(1),
        };

        if head >= from {
            let query = LogQuery::descendants("").from(from).to(head);
            let mut entries = self.ops.log(&query)?;
            tracing::debug!(from = %from, to = %head, changes = entries.len(), "scanning for deletions");

            // oldest first, so the latest change to a path wins
            entries.reverse();
            for entry in entries {
                state.apply(ChangeInfo::from(entry));
            }
        }

        state.scanned_to = Some(head);
        Ok(())
    }
}

impl DeletedRevisionTracker for InMemoryDeletedRevisionTracker {
    fn change_that_deleted(&self, path: &str) -> PageStoreResult<Option<ChangeInfo>> {
        let mut state = self.state.lock();
        self.catch_up(&mut state)?;
        Ok(state.deletions.get(path).cloned())
    }

    fn record_deletion(&self, change: ChangeInfo) {
        if !change.is_deletion() {
            return;
        }
        let mut state = self.state.lock();
        let newer = state
            .deletions
            .get(&change.path)
            .map_or(true, |known| known.revision < change.revision);
        if newer {
            state.deletions.insert(change.path.clone(), change);
        }
    }

    fn rebuild(&self) -> PageStoreResult<()> {
        let mut state = self.state.lock();
        *state = TrackerState::default();
        self.catch_up(&mut state)?;
        tracing::info!(deleted = state.deletions.len(), "rebuilt deletion tracker");
        Ok(())
    }
}
