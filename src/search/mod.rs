//! Incremental search indexing over a page store.
//!
//! The builder consumes two things from the store: `changed_between` to
//! learn which pages to revisit, and `get` at head, whose new-page
//! placeholder tells it to drop a page instead of indexing it.

mod builder;
mod error;
mod index;

pub use builder::{CancellationToken, IndexBuilder, IndexOutcome, IndexWorker};
pub use error::{IndexError, IndexResult};
pub use index::{IndexedPage, MemorySearchIndex, SearchIndex};
