//! Wiki configuration.

use std::path::PathBuf;
use std::sync::Arc;

use crate::search::{IndexResult, MemorySearchIndex};
use crate::storage::{GitRepository, GitSignature, RepositoryError};
use crate::vc::{ConfigCachingPageStore, PageStoreResult, VersionedPageStore};

/// Configuration for opening a wiki.
#[derive(Debug, Clone)]
pub struct WikiConfig {
    /// Name of the wiki the store serves.
    pub wiki_name: String,
    /// Path to the repository directory.
    pub path: PathBuf,
    /// Create if doesn't exist.
    pub create_if_missing: bool,
    /// Who commits and locks go out as.
    pub author: GitSignature,
    /// If set, only these users may commit or lock.
    pub authorized_authors: Option<Vec<String>>,
    /// Where the search index keeps its highest indexed revision.
    pub index_marker: Option<PathBuf>,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            wiki_name: "wiki".to_string(),
            path: PathBuf::from(".revwiki"),
            create_if_missing: true,
            author: GitSignature::revwiki(),
            authorized_authors: None,
            index_marker: None,
        }
    }
}

impl WikiConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn wiki_name(mut self, name: impl Into<String>) -> Self {
        self.wiki_name = name.into();
        self
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author = GitSignature::new(name, email);
        self
    }

    pub fn authorized_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    pub fn index_marker(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_marker = Some(path.into());
        self
    }

    /// Open (or create) the repository, acting as the configured author.
    pub fn open_repository(&self) -> PageStoreResult<GitRepository> {
        let repo = if self.create_if_missing {
            GitRepository::open_or_init(&self.path)?
        } else if self.path.exists() {
            GitRepository::open(&self.path)?
        } else {
            return Err(RepositoryError::NotInitialized(self.path.clone()).into());
        };

        if let Some(authors) = &self.authorized_authors {
            repo.restrict_authors(authors.iter().cloned());
        }
        Ok(repo.with_signature(self.author.clone()))
    }

    /// Open the page store, with configuration pages cached.
    pub fn open_store(&self) -> PageStoreResult<ConfigCachingPageStore<VersionedPageStore>> {
        let repo = Arc::new(self.open_repository()?);
        tracing::debug!(wiki = %self.wiki_name, path = %self.path.display(), "opened page store");
        Ok(ConfigCachingPageStore::new(VersionedPageStore::new(&self.wiki_name, repo)))
    }

    pub fn open_index(&self) -> IndexResult<MemorySearchIndex> {
        match &self.index_marker {
            Some(path) => MemorySearchIndex::with_marker_file(path),
            None => Ok(MemorySearchIndex::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Expected, RepositoryOperations};
    use crate::vc::{PageReference, PageStore, PageStoreError};
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = WikiConfig::default();
        assert_eq!(config.wiki_name, "wiki");
        assert!(config.create_if_missing);
        assert!(config.authorized_authors.is_none());
    }

    #[test]
    fn test_missing_repository_without_create() {
        let dir = TempDir::new().unwrap();
        let config = WikiConfig::new(dir.path().join("absent")).create_if_missing(false);
        assert!(matches!(
            config.open_repository(),
            Err(PageStoreError::Repository(RepositoryError::NotInitialized(_)))
        ));
    }

    #[test]
    fn test_open_store_as_author() {
        let dir = TempDir::new().unwrap();
        let config = WikiConfig::new(dir.path())
            .wiki_name("team")
            .author("alice", "alice@example.com")
            .authorized_authors(["alice"]);

        let store = config.open_store().unwrap();
        assert_eq!(store.wiki_name(), "team");
        let page = PageReference::new("FrontPage").unwrap();
        store.set(&page, Expected::Absent, "Hello", "Create").unwrap();
        assert_eq!(store.get(&page, None).unwrap().author.as_deref(), Some("alice"));

        let repo = config.open_repository().unwrap();
        assert_eq!(repo.user(), "alice");

        let intruder = config.clone().author("mallory", "m@example.com").open_store().unwrap();
        let err = intruder.set(&page, Expected::Any, "x", "Hijack").unwrap_err();
        assert!(err.is_authentication());
    }
}
