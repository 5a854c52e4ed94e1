//! The versioned page store.
//!
//! This module maps wiki pages and their attachments onto repository paths
//! and puts an optimistic-concurrency edit protocol on top.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          PageStore (VersionedPageStore, caching)            │
//! │   (get/set, attachments, rename, history, changed pages)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │CommitAction │       │   history   │       │  Deleted    │
//!  │(path ops)   │       │ (lineage)   │       │  tracker    │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!                              │
//!                              ▼
//!                   RepositoryOperations
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use revwiki::storage::{Expected, GitRepository};
//! use revwiki::vc::{PageReference, PageStore, VersionedPageStore};
//!
//! let repo = Arc::new(GitRepository::open_or_init("./wiki")?);
//! let store = VersionedPageStore::new("wiki", repo);
//!
//! let page = PageReference::new("FrontPage")?;
//! let revision = store.set(&page, Expected::Absent, "Hello", "Create")?;
//! let history = store.history(&page)?;
//! ```

mod action;
mod caching;
mod error;
mod history;
mod store;
#[cfg(test)]
mod testing;
mod tracker;
mod types;

pub use action::{ActionError, CommitAction, PathOperation};
pub use caching::ConfigCachingPageStore;
pub use error::{PageStoreError, PageStoreResult};
pub use store::{PageStore, VersionedPageStore};
pub use tracker::{DeletedRevisionTracker, InMemoryDeletedRevisionTracker};
pub use types::{
    AttachmentHistory, ChangeInfo, ChangeType, InvalidNameError, PageReference, StoreKind, VersionedPageInfo,
    ATTACHMENTS_SUFFIX,
};
