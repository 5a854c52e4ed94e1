//! A page store decorator that keeps configuration pages in memory.
//!
//! Configuration pages are read on nearly every request. The cache only
//! serves head reads and only knows about writes made through it.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use crate::storage::{Expected, LockInfo, Revision};
use crate::vc::error::PageStoreResult;
use crate::vc::store::PageStore;
use crate::vc::types::{AttachmentHistory, ChangeInfo, PageReference, VersionedPageInfo};

#[derive(Default)]
struct Cache {
    pages: HashMap<PageReference, VersionedPageInfo>,
    /// bumped on every invalidation; a read that started under an older
    /// generation must not populate the cache
    generation: u64,
}

pub struct ConfigCachingPageStore<S> {
    inner: S,
    cache: RwLock<Cache>,
}

impl<S: PageStore> ConfigCachingPageStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: RwLock::new(Cache::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn invalidate(&self, page: &PageReference) {
        if !page.is_config_page() {
            return;
        }
        let mut cache = self.cache.write();
        cache.generation += 1;
        if cache.pages.remove(page).is_some() {
            tracing::debug!(page = %page, "dropped cached config page");
        }
    }

    /// Run a write with the page invalidated on both sides of it.
    fn write_through<T>(&self, pages: &[&PageReference], write: impl FnOnce() -> T) -> T {
        for page in pages {
            self.invalidate(page);
        }
        let result = write();
        for page in pages {
            self.invalidate(page);
        }
        result
    }
}

impl<S: PageStore> PageStore for ConfigCachingPageStore<S> {
    fn wiki_name(&self) -> &str {
        self.inner.wiki_name()
    }

    fn latest_revision(&self) -> PageStoreResult<Revision> {
        self.inner.latest_revision()
    }

    fn get(&self, page: &PageReference, revision: Option<Revision>) -> PageStoreResult<VersionedPageInfo> {
        if revision.is_some() || !page.is_config_page() {
            return self.inner.get(page, revision);
        }
        let generation = {
            let cache = self.cache.read();
            if let Some(cached) = cache.pages.get(page) {
                return Ok(cached.clone());
            }
            cache.generation
        };
        let info = self.inner.get(page, None)?;
        let mut cache = self.cache.write();
        if cache.generation == generation {
            cache.pages.insert(page.clone(), info.clone());
        }
        Ok(info)
    }

    fn set(&self, page: &PageReference, expected: Expected, content: &str, message: &str) -> PageStoreResult<Revision> {
        self.write_through(&[page], || self.inner.set(page, expected, content, message))
    }

    fn delete(&self, page: &PageReference, expected: Expected, message: &str) -> PageStoreResult<Revision> {
        self.write_through(&[page], || self.inner.delete(page, expected, message))
    }

    fn attachments(&self, page: &PageReference) -> PageStoreResult<Vec<AttachmentHistory>> {
        self.inner.attachments(page)
    }

    fn attach(
        &self,
        page: &PageReference,
        name: &str,
        expected: Expected,
        content: &[u8],
        message: &str,
    ) -> PageStoreResult<Revision> {
        self.inner.attach(page, name, expected, content, message)
    }

    fn attachment(&self, page: &PageReference, name: &str, revision: Option<Revision>) -> PageStoreResult<Vec<u8>> {
        self.inner.attachment(page, name, revision)
    }

    fn delete_attachment(
        &self,
        page: &PageReference,
        name: &str,
        expected: Expected,
        message: &str,
    ) -> PageStoreResult<Revision> {
        self.inner.delete_attachment(page, name, expected, message)
    }

    fn rename(
        &self,
        from: &PageReference,
        to: &PageReference,
        move_attachments: bool,
        expected: Expected,
        message: &str,
    ) -> PageStoreResult<Revision> {
        self.write_through(&[from, to], || {
            self.inner.rename(from, to, move_attachments, expected, message)
        })
    }

    fn history(&self, page: &PageReference) -> PageStoreResult<Vec<ChangeInfo>> {
        self.inner.history(page)
    }

    fn changed_between(&self, from: Revision, to: Revision) -> PageStoreResult<BTreeSet<PageReference>> {
        self.inner.changed_between(from, to)
    }

    fn list(&self) -> PageStoreResult<Vec<PageReference>> {
        self.inner.list()
    }

    fn recent_changes(&self, limit: usize) -> PageStoreResult<Vec<ChangeInfo>> {
        self.inner.recent_changes(limit)
    }

    fn try_to_lock(&self, page: &PageReference) -> PageStoreResult<Option<LockInfo>> {
        self.inner.try_to_lock(page)
    }

    fn unlock(&self, page: &PageReference, token: &str) -> PageStoreResult<()> {
        self.inner.unlock(page, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{GitRepository, RepositoryOperations};
    use crate::vc::store::VersionedPageStore;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<GitRepository>, ConfigCachingPageStore<VersionedPageStore>) {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(GitRepository::init(dir.path()).unwrap());
        let store = ConfigCachingPageStore::new(VersionedPageStore::new("wiki", repo.clone()));
        (dir, repo, store)
    }

    #[test]
    fn test_config_pages_are_cached_until_written() {
        let (_dir, repo, store) = setup();
        let config = PageReference::new("ConfigInterWikiLinks").unwrap();
        let created = store.set(&config, Expected::Absent, "v1", "Create").unwrap();
        assert_eq!(store.get(&config, None).unwrap().content, "v1");

        // a write behind the cache's back is not seen
        let mut editor = repo.open_editor("Sneaky").unwrap();
        editor.modify_file("ConfigInterWikiLinks", created, b"sneaky").unwrap();
        let sneaky = editor.close().unwrap();
        assert_eq!(store.get(&config, None).unwrap().content, "v1");
        assert_eq!(store.get(&config, Some(sneaky)).unwrap().content, "sneaky");

        store.set(&config, Expected::At(sneaky), "v2", "Edit").unwrap();
        assert_eq!(store.get(&config, None).unwrap().content, "v2");
    }

    #[test]
    fn test_other_pages_pass_through() {
        let (_dir, repo, store) = setup();
        let front = PageReference::new("FrontPage").unwrap();
        let created = store.set(&front, Expected::Absent, "v1", "Create").unwrap();
        assert_eq!(store.get(&front, None).unwrap().content, "v1");

        let mut editor = repo.open_editor("Direct").unwrap();
        editor.modify_file("FrontPage", created, b"v2").unwrap();
        editor.close().unwrap();
        assert_eq!(store.get(&front, None).unwrap().content, "v2");
        assert!(store.inner().tracker().change_that_deleted("FrontPage").unwrap().is_none());
    }

    /// Delegates to a git-backed store; a `get` can be made to pause
    /// between reading and returning.
    struct PausingStore {
        inner: VersionedPageStore,
        pause: parking_lot::Mutex<Option<Arc<Barrier>>>,
    }

    impl PageStore for PausingStore {
        fn wiki_name(&self) -> &str {
            self.inner.wiki_name()
        }
        fn latest_revision(&self) -> PageStoreResult<Revision> {
            self.inner.latest_revision()
        }
        fn get(&self, page: &PageReference, revision: Option<Revision>) -> PageStoreResult<VersionedPageInfo> {
            let info = self.inner.get(page, revision)?;
            let pause = self.pause.lock().take();
            if let Some(barrier) = pause {
                barrier.wait();
                barrier.wait();
            }
            Ok(info)
        }
        fn set(&self, page: &PageReference, expected: Expected, content: &str, message: &str) -> PageStoreResult<Revision> {
            self.inner.set(page, expected, content, message)
        }
        fn delete(&self, page: &PageReference, expected: Expected, message: &str) -> PageStoreResult<Revision> {
            self.inner.delete(page, expected, message)
        }
        fn attachments(&self, page: &PageReference) -> PageStoreResult<Vec<AttachmentHistory>> {
            self.inner.attachments(page)
        }
        fn attach(
            &self,
            page: &PageReference,
            name: &str,
            expected: Expected,
            content: &[u8],
            message: &str,
        ) -> PageStoreResult<Revision> {
            self.inner.attach(page, name, expected, content, message)
        }
        fn attachment(&self, page: &PageReference, name: &str, revision: Option<Revision>) -> PageStoreResult<Vec<u8>> {
            self.inner.attachment(page, name, revision)
        }
        fn delete_attachment(
            &self,
            page: &PageReference,
            name: &str,
            expected: Expected,
            message: &str,
        ) -> PageStoreResult<Revision> {
            self.inner.delete_attachment(page, name, expected, message)
        }
        fn rename(
            &self,
            from: &PageReference,
            to: &PageReference,
            move_attachments: bool,
            expected: Expected,
            message: &str,
        ) -> PageStoreResult<Revision> {
            self.inner.rename(from, to, move_attachments, expected, message)
        }
        fn history(&self, page: &PageReference) -> PageStoreResult<Vec<ChangeInfo>> {
            self.inner.history(page)
        }
        fn changed_between(&self, from: Revision, to: Revision) -> PageStoreResult<BTreeSet<PageReference>> {
            self.inner.changed_between(from, to)
        }
        fn list(&self) -> PageStoreResult<Vec<PageReference>> {
            self.inner.list()
        }
        fn recent_changes(&self, limit: usize) -> PageStoreResult<Vec<ChangeInfo>> {
            self.inner.recent_changes(limit)
        }
        fn try_to_lock(&self, page: &PageReference) -> PageStoreResult<Option<LockInfo>> {
            self.inner.try_to_lock(page)
        }
        fn unlock(&self, page: &PageReference, token: &str) -> PageStoreResult<()> {
            self.inner.unlock(page, token)
        }
    }

    #[test]
    fn test_read_overtaken_by_write_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(GitRepository::init(dir.path()).unwrap());
        let barrier = Arc::new(Barrier::new(2));
        let store = Arc::new(ConfigCachingPageStore::new(PausingStore {
            inner: VersionedPageStore::new("wiki", repo),
            pause: parking_lot::Mutex::new(None),
        }));
        let config = PageReference::new("ConfigSideBar").unwrap();
        let created = store.set(&config, Expected::Absent, "v1", "Create").unwrap();

        *store.inner().pause.lock() = Some(barrier.clone());
        let reader = {
            let store = store.clone();
            let config = config.clone();
            thread::spawn(move || store.get(&config, None).unwrap().content)
        };

        // the reader has read v1 and is paused before filling the cache
        barrier.wait();
        store.set(&config, Expected::At(created), "v2", "Edit").unwrap();
        barrier.wait();

        assert_eq!(reader.join().unwrap(), "v1");
        assert_eq!(store.get(&config, None).unwrap().content, "v2");
    }
}
