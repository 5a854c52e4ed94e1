//! The incremental index builder.
//!
//! Each pass asks the store which pages changed since the highest indexed
//! revision and re-indexes them one by one. The marker only moves after a
//! pass completed, so a cancelled or failed pass is simply redone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::search::error::{IndexError, IndexResult};
use crate::search::index::SearchIndex;
use crate::storage::Revision;
use crate::vc::{PageReference, PageStore};

/// A cooperative stop signal shared between a worker and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// how an indexing pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// nothing was committed since the last pass
    UpToDate(Option<Revision>),
    Completed {
        revision: Revision,
        indexed: usize,
        skipped: usize,
    },
    /// stopped between pages; the marker was left alone
    Cancelled { indexed: usize },
}

pub struct IndexBuilder {
    store: Arc<dyn PageStore>,
    index: Arc<dyn SearchIndex>,
}

impl IndexBuilder {
    pub fn new(store: Arc<dyn PageStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self { store, index }
    }

    /// Bring the index up to the latest revision.
    pub fn build(&self, cancel: &CancellationToken) -> IndexResult<IndexOutcome> {
        let latest = self.store.latest_revision()?;
        let highest = self.index.highest_indexed_revision()?;
        let from = match highest {
            Some(highest) if highest >= latest => return Ok(IndexOutcome::UpToDate(Some(highest))),
            Some(highest) => highest.next(),
            None => Revision::ZERO,
        };

        let from_scratch = highest.is_none();
        self.index.set_index_being_built(from_scratch);
        let result = self.index_range(from, latest, cancel);
        self.index.set_index_being_built(false);

        match &result {
            Ok(outcome) => tracing::info!(wiki = self.store.wiki_name(), ?outcome, "indexing pass finished"),
            Err(err) if err.is_authentication() => {
                tracing::warn!(wiki = self.store.wiki_name(), error = %err, "indexing aborted");
                self.index.remember_highest_indexed_revision(None)?;
            }
            Err(err) => tracing::warn!(wiki = self.store.wiki_name(), error = %err, "indexing failed"),
        }
        result
    }

    fn index_range(&self, from: Revision, to: Revision, cancel: &CancellationToken) -> IndexResult<IndexOutcome> {
        let pages = self.store.changed_between(from, to)?;
        tracing::debug!(from = %from, to = %to, pages = pages.len(), "indexing changed pages");

        let mut indexed = 0;
        let mut skipped = 0;
        for page in pages {
            if cancel.is_cancelled() {
                return Ok(IndexOutcome::Cancelled { indexed });
            }
            match self.index_page(&page) {
                Ok(()) => indexed += 1,
                Err(err) if err.is_authentication() => return Err(err),
                Err(err) => {
                    tracing::warn!(page = %page, error = %err, "skipping page");
                    skipped += 1;
                }
            }
        }

        self.index.remember_highest_indexed_revision(Some(to))?;
        Ok(IndexOutcome::Completed {
            revision: to,
            indexed,
            skipped,
        })
    }

    /// a page that is gone at head comes back as a new page, which means
    /// remove it
    fn index_page(&self, page: &PageReference) -> IndexResult<()> {
        let info = self.store.get(page, None).map_err(IndexError::from)?;
        if info.is_new_page() {
            self.index.delete(page)
        } else {
            self.index.index(&info)
        }
    }

    /// Run passes every `interval` on a background thread until stopped.
    pub fn spawn(self, interval: Duration) -> IndexWorker {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = thread::spawn(move || {
            while !token.is_cancelled() {
                if let Err(err) = self.build(&token) {
                    if err.is_authentication() {
                        tracing::warn!(error = %err, "index worker stopping");
                        break;
                    }
                }
                sleep_unless_cancelled(interval, &token);
            }
        });
        IndexWorker { cancel, handle }
    }
}

fn sleep_unless_cancelled(interval: Duration, cancel: &CancellationToken) {
    let step = Duration::from_millis(50);
    let mut slept = Duration::ZERO;
    while slept < interval && !cancel.is_cancelled() {
        thread::sleep(step.min(interval - slept));
        slept += step;
    }
}

/// a running background index builder
pub struct IndexWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl IndexWorker {
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// cancel and wait for the current page to finish
    pub fn stop(self) {
        self.cancel.cancel();
        if self.handle.join().is_err() {
            tracing::warn!("index worker panicked");
        }
    }
}
