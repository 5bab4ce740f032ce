//! Read-through access used by the query services.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::config::CacheConfig;
use super::store::CacheStore;

/// Store handle plus the lifetimes each read path uses. With caching
/// disabled every fetch goes straight to the producer.
#[derive(Clone)]
pub struct ReadThrough {
    store: Arc<CacheStore>,
    config: CacheConfig,
}

impl ReadThrough {
    pub fn new(store: Arc<CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn fetch<T, E, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.config.enabled {
            return producer().await;
        }
        self.store.get_or_set(key, Some(ttl), producer).await
    }
}
