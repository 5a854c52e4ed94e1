//! revwiki - A Git-backed Versioned Wiki Page Store
//!
//! This crate stores wiki pages and their attachments in a path-versioned
//! repository. Every edit is a commit with a global revision number, renames
//! keep their history, and edits are accepted only against the revision
//! they were based on.
//!
//! # Example
//!
//! ```no_run
//! use revwiki::config::WikiConfig;
//! use revwiki::storage::Expected;
//! use revwiki::vc::{PageReference, PageStore};
//!
//! let store = WikiConfig::new("./my_wiki").open_store().unwrap();
//! let page = PageReference::new("FrontPage").unwrap();
//! let revision = store.set(&page, Expected::Absent, "Hello", "Create").unwrap();
//! let history = store.history(&page).unwrap();
//! ```

pub mod config;
pub mod search;
pub mod storage;
pub mod vc;
