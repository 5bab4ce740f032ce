//! Pattern-based invalidation applied after successful writes.

use std::sync::Arc;

use tracing::debug;

use super::keys::{ARTICLES_PREFIX, CATEGORIES_PREFIX, DOWNLOADS_PREFIX};
use super::store::CacheStore;

#[derive(Clone)]
pub struct CacheInvalidation {
    store: Arc<CacheStore>,
}

impl CacheInvalidation {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn articles(&self) -> usize {
        self.pattern(ARTICLES_PREFIX)
    }

    /// Article listings filter by category, so they go too.
    pub fn categories(&self) -> usize {
        self.pattern(CATEGORIES_PREFIX) + self.pattern(ARTICLES_PREFIX)
    }

    pub fn downloads(&self) -> usize {
        self.pattern(DOWNLOADS_PREFIX)
    }

    pub fn all(&self) -> usize {
        let removed = self.store.clear();
        debug!(
            target = "mediawatch::cache::invalidation",
            removed, "cleared cache"
        );
        removed
    }

    pub fn pattern(&self, pattern: &str) -> usize {
        let removed = self.store.invalidate_pattern(pattern);
        debug!(
            target = "mediawatch::cache::invalidation",
            pattern, removed, "invalidated cache entries"
        );
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::super::config::CacheConfig;
    use super::*;

    fn seeded() -> CacheInvalidation {
        let store = Arc::new(CacheStore::new(&CacheConfig::default()));
        for key in [
            "articles:list:_|_|_|_|_|_|_|_|_|_",
            "articles:detail:1:en",
            "categories:list",
            "downloads:list:_|_|_|_",
        ] {
            store.set(key, 1_u8, None);
        }
        CacheInvalidation::new(store)
    }

    #[test]
    fn articles_leaves_other_entities() {
        let invalidation = seeded();
        assert_eq!(invalidation.articles(), 2);
        assert_eq!(invalidation.store().len(), 2);
    }

    #[test]
    fn categories_also_drops_article_entries() {
        let invalidation = seeded();
        assert_eq!(invalidation.categories(), 3);
        assert!(invalidation.store().has("downloads:list:_|_|_|_"));
    }

    #[test]
    fn downloads_and_all() {
        let invalidation = seeded();
        assert_eq!(invalidation.downloads(), 1);
        assert_eq!(invalidation.all(), 3);
        assert!(invalidation.store().is_empty());
    }
}
