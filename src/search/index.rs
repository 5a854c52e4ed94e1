//! The index the builder feeds, and an in-memory implementation of it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::search::error::IndexResult;
use crate::storage::Revision;
use crate::vc::{PageReference, VersionedPageInfo};

/// What the index builder needs from a search index.
///
/// The index owns the "highest indexed revision" marker; the builder only
/// moves it after a pass completed.
pub trait SearchIndex: Send + Sync {
    /// add or replace a page
    fn index(&self, page: &VersionedPageInfo) -> IndexResult<()>;

    fn delete(&self, page: &PageReference) -> IndexResult<()>;

    fn highest_indexed_revision(&self) -> IndexResult<Option<Revision>>;

    fn remember_highest_indexed_revision(&self, revision: Option<Revision>) -> IndexResult<()>;

    /// whether a pass from scratch is under way
    fn set_index_being_built(&self, building: bool);

    fn is_index_being_built(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedPage {
    pub revision: Option<Revision>,
    pub author: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub content: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Marker {
    highest_indexed_revision: Option<Revision>,
}

/// A search index held in memory.
///
/// With a marker file the highest indexed revision survives restarts; the
/// pages themselves do not, so a fresh process should start from
/// [`MemorySearchIndex::new`] and let the builder index from scratch.
pub struct MemorySearchIndex {
    pages: RwLock<BTreeMap<PageReference, IndexedPage>>,
    marker: RwLock<Option<Revision>>,
    marker_file: Option<PathBuf>,
    building: AtomicBool,
}

impl Default for MemorySearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self {
            pages: RwLock::new(BTreeMap::new()),
            marker: RwLock::new(None),
            marker_file: None,
            building: AtomicBool::new(false),
        }
    }

    /// an index whose marker is persisted as JSON at `path`
    pub fn with_marker_file(path: impl Into<PathBuf>) -> IndexResult<Self> {
        let path = path.into();
        let marker = if path.exists() {
            let marker: Marker = serde_json::from_str(&fs::read_to_string(&path)?)?;
            marker.highest_indexed_revision
        } else {
            None
        };
        tracing::debug!(path = %path.display(), marker = ?marker, "loaded index marker");

        Ok(Self {
            marker: RwLock::new(marker),
            marker_file: Some(path),
            ..Self::new()
        })
    }

    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }

    pub fn page(&self, page: &PageReference) -> Option<IndexedPage> {
        self.pages.read().get(page).cloned()
    }

    /// pages whose name or content contains every word, case-insensitively
    pub fn search(&self, query: &str) -> Vec<PageReference> {
        let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if words.is_empty() {
            return Vec::new();
        }
        self.pages
            .read()
            .iter()
            .filter(|(page, indexed)| {
                let haystack = format!("{}\n{}", page.name(), indexed.content).to_lowercase();
                words.iter().all(|word| haystack.contains(word.as_str()))
            })
            .map(|(page, _)| page.clone())
            .collect()
    }

    fn write_marker(path: &Path, revision: Option<Revision>) -> IndexResult<()> {
        let json = serde_json::to_string_pretty(&Marker {
            highest_indexed_revision: revision,
        })?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl SearchIndex for MemorySearchIndex {
    fn index(&self, page: &VersionedPageInfo) -> IndexResult<()> {
        self.pages.write().insert(
            page.page.clone(),
            IndexedPage {
                revision: page.revision,
                author: page.author.clone(),
                timestamp: page.timestamp,
                content: page.content.clone(),
            },
        );
        Ok(())
    }

    fn delete(&self, page: &PageReference) -> IndexResult<()> {
        self.pages.write().remove(page);
        Ok(())
    }

    fn highest_indexed_revision(&self) -> IndexResult<Option<Revision>> {
        Ok(*self.marker.read())
    }

    fn remember_highest_indexed_revision(&self, revision: Option<Revision>) -> IndexResult<()> {
        if let Some(path) = &self.marker_file {
            Self::write_marker(path, revision)?;
        }
        *self.marker.write() = revision;
        Ok(())
    }

    fn set_index_being_built(&self, building: bool) {
        self.building.store(building, Ordering::SeqCst);
    }

    fn is_index_being_built(&self) -> bool {
        self.building.load(Ordering::SeqCst)
    }
}
