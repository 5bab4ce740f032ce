//! In-process TTL cache.
//!
//! Entries are keyed by string and hold type-erased values. Capacity is bounded:
//! an insert of a new key into a full store evicts the least recently accessed
//! entry. Expired entries are dropped lazily on read and eagerly by the sweep
//! task started with [`CacheStore::start`].

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::config::CacheConfig;
use super::lock::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "mediawatch_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "mediawatch_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "mediawatch_cache_evict_total";
pub(crate) const METRIC_CACHE_ENTRIES: &str = "mediawatch_cache_entries";

type CachedValue = Arc<dyn Any + Send + Sync>;

/// Producer slot for one key.
struct Flight {
    gate: Arc<AsyncMutex<()>>,
    /// Callers holding or queued on `gate`.
    waiters: usize,
}

struct CacheEntry {
    value: CachedValue,
    stored_at: Instant,
    ttl: Duration,
    access_count: u64,
    last_accessed: Instant,
    /// Monotonic touch order; orders entries whose `last_accessed` coincide.
    touched: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

/// Counters and occupancy reported by [`CacheStore::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub max_entries: usize,
    /// `hits / (hits + misses)`, zero before the first lookup.
    pub hit_rate: f64,
}

pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    inflight: Mutex<HashMap<String, Flight>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    touches: AtomicU64,
    default_ttl: Duration,
    max_entries: usize,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            touches: AtomicU64::new(0),
            default_ttl: config.default_ttl(),
            max_entries: config.max_entries_non_zero().get(),
            sweep_interval: config.sweep_interval(),
            sweeper: Mutex::new(None),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up `key`, counting a hit or a miss.
    ///
    /// Expired entries and entries holding a value of another type are removed
    /// and reported as misses.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let found = self.lookup::<T>(key);
        if found.is_some() {
            self.record_hit();
        } else {
            self.record_miss();
        }
        found
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_HIT).increment(1);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_MISS).increment(1);
    }

    fn lookup<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");

        let value = match entries.get_mut(key) {
            None => return None,
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => match entry.value.clone().downcast::<T>() {
                Ok(value) => {
                    entry.access_count += 1;
                    entry.last_accessed = now;
                    entry.touched = self.touches.fetch_add(1, Ordering::Relaxed);
                    Some(value)
                }
                Err(_) => {
                    debug!(
                        target = "mediawatch::cache",
                        key,
                        "cached value has a different type, dropping entry"
                    );
                    None
                }
            },
        };

        match value {
            Some(value) => Some((*value).clone()),
            None => {
                entries.remove(key);
                gauge!(METRIC_CACHE_ENTRIES).set(entries.len() as f64);
                None
            }
        }
    }

    /// Store `value` under `key`. `ttl = None` uses the store default.
    pub fn set<T>(&self, key: impl Into<String>, value: T, ttl: Option<Duration>)
    where
        T: Send + Sync + 'static,
    {
        let key = key.into();
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "set");

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            self.evict_one(&mut entries);
        }

        entries.insert(
            key,
            CacheEntry {
                value: Arc::new(value),
                stored_at: now,
                ttl: ttl.unwrap_or(self.default_ttl),
                access_count: 0,
                last_accessed: now,
                touched: self.touches.fetch_add(1, Ordering::Relaxed),
            },
        );
        gauge!(METRIC_CACHE_ENTRIES).set(entries.len() as f64);
    }

    fn evict_one(&self, entries: &mut HashMap<String, CacheEntry>) {
        let victim = entries
            .iter()
            .min_by_key(|(_, entry)| (entry.last_accessed, entry.touched))
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            if let Some(entry) = entries.remove(&key) {
                debug!(
                    target = "mediawatch::cache",
                    key = %key,
                    access_count = entry.access_count,
                    "evicted least recently accessed entry"
                );
            }
            self.evictions.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_CACHE_EVICT).increment(1);
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut entries = rw_write(&self.entries, SOURCE, "delete");
        let removed = entries.remove(key).is_some();
        gauge!(METRIC_CACHE_ENTRIES).set(entries.len() as f64);
        removed
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        let removed = entries.len();
        entries.clear();
        gauge!(METRIC_CACHE_ENTRIES).set(0.0);
        removed
    }

    /// Whether a live entry exists. Does not touch counters or access order.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "has")
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remove every entry whose key contains `pattern`; returns the count.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "invalidate_pattern");
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        let removed = before - entries.len();
        gauge!(METRIC_CACHE_ENTRIES).set(entries.len() as f64);
        removed
    }

    /// Remove entries past their TTL; returns the count.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "purge_expired");
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        gauge!(METRIC_CACHE_ENTRIES).set(entries.len() as f64);
        removed
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
            max_entries: self.max_entries,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    /// Return the cached value for `key`, or run `producer` and cache its
    /// output.
    ///
    /// Concurrent misses on the same key are collapsed: one caller runs the
    /// producer while the others wait and then read its result. Producer
    /// errors are returned to that caller and nothing is stored. Each call
    /// counts exactly one hit or one miss; waiters served by another caller's
    /// producer count as hits.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.lookup::<T>(key) {
            self.record_hit();
            return Ok(value);
        }

        let _flight = self.join_flight(key).await;
        if let Some(value) = self.lookup::<T>(key) {
            self.record_hit();
            return Ok(value);
        }

        self.record_miss();
        let value = producer().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    async fn join_flight(&self, key: &str) -> FlightGuard<'_> {
        let gate = {
            let mut inflight = mutex_lock(&self.inflight, SOURCE, "join_flight");
            let flight = inflight.entry(key.to_string()).or_insert_with(|| Flight {
                gate: Arc::new(AsyncMutex::new(())),
                waiters: 0,
            });
            flight.waiters += 1;
            flight.gate.clone()
        };
        // Built before the await so a caller cancelled in the queue still
        // leaves the flight.
        let mut guard = FlightGuard {
            store: self,
            key: key.to_string(),
            permit: None,
        };
        guard.permit = Some(gate.lock_owned().await);
        guard
    }

    /// Spawn the periodic sweep. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = mutex_lock(&self.sweeper, SOURCE, "start");
        if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let store: Weak<Self> = Arc::downgrade(self);
        let period = self.sweep_interval;
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(
                        target = "mediawatch::cache",
                        purged,
                        remaining = store.len(),
                        "swept expired cache entries"
                    );
                }
            }
        }));
        info!(
            target = "mediawatch::cache",
            interval_secs = period.as_secs(),
            "cache sweep started"
        );
    }

    pub fn stop(&self) {
        if let Some(handle) = mutex_lock(&self.sweeper, SOURCE, "stop").take() {
            handle.abort();
            info!(target = "mediawatch::cache", "cache sweep stopped");
        }
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        if let Some(handle) = mutex_lock(&self.sweeper, SOURCE, "drop").take() {
            handle.abort();
        }
    }
}

/// Membership in a key's flight; the slot is removed when its last member
/// leaves, whether it held the permit or was still queued.
struct FlightGuard<'a> {
    store: &'a CacheStore,
    key: String,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        drop(self.permit.take());
        let mut inflight = mutex_lock(&self.store.inflight, SOURCE, "leave_flight");
        if let Some(flight) = inflight.get_mut(&self.key) {
            flight.waiters = flight.waiters.saturating_sub(1);
            if flight.waiters == 0 {
                inflight.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn store_with(max_entries: usize) -> CacheStore {
        CacheStore::new(&CacheConfig {
            max_entries,
            ..Default::default()
        })
    }

    #[test]
    fn set_then_get_counts_a_hit() {
        let store = store_with(10);
        store.set("articles:detail:1", "hello".to_string(), None);

        assert_eq!(
            store.get::<String>("articles:detail:1").as_deref(),
            Some("hello")
        );
        assert!(store.get::<String>("articles:detail:2").is_none());

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn type_mismatch_is_a_miss_and_drops_the_entry() {
        let store = store_with(10);
        store.set("k", 7_u32, None);

        assert!(store.get::<String>("k").is_none());
        assert!(!store.has("k"));
        assert_eq!(store.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_miss_and_are_removed() {
        let store = store_with(10);
        store.set("k", 1_u8, Some(Duration::from_millis(50)));

        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(store.get::<u8>("k"), Some(1));

        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(!store.has("k"));
        assert_eq!(store.get::<u8>("k"), None);
        assert!(store.is_empty());
        assert_eq!(store.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_store_evicts_least_recently_accessed() {
        let store = store_with(3);
        for key in ["a", "b", "c"] {
            store.set(key, key.to_string(), None);
            tokio::time::advance(Duration::from_millis(5)).await;
        }

        assert!(store.get::<String>("a").is_some());
        tokio::time::advance(Duration::from_millis(5)).await;
        store.set("d", "d".to_string(), None);

        assert_eq!(store.len(), 3);
        assert!(!store.has("b"));
        assert!(store.has("a"));
        assert!(store.has("c"));
        assert!(store.has("d"));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn overwriting_a_key_never_evicts() {
        let store = store_with(2);
        store.set("a", 1_i32, None);
        store.set("b", 2_i32, None);
        store.set("a", 3_i32, None);

        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().evictions, 0);
        assert_eq!(store.get::<i32>("a"), Some(3));
    }

    #[test]
    fn has_does_not_touch_counters() {
        let store = store_with(10);
        store.set("k", 1_i32, None);
        assert!(store.has("k"));
        assert!(!store.has("missing"));

        let stats = store.stats();
        assert_eq!(stats.hits + stats.misses, 0);
    }

    #[test]
    fn invalidate_pattern_matches_substrings() {
        let store = store_with(10);
        store.set("articles:list:a", 1_i32, None);
        store.set("articles:detail:1", 1_i32, None);
        store.set("categories:list:en", 1_i32, None);

        assert_eq!(store.invalidate_pattern("articles"), 2);
        assert!(store.has("categories:list:en"));
        assert_eq!(store.invalidate_pattern("nothing-matches"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired_entries() {
        let store = store_with(10);
        store.set("short", 1_i32, Some(Duration::from_secs(1)));
        store.set("long", 1_i32, Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert!(store.has("long"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_task_purges_in_the_background() {
        let store = Arc::new(CacheStore::new(&CacheConfig {
            sweep_interval_secs: 60,
            ..Default::default()
        }));
        store.set("k", 1_i32, Some(Duration::from_secs(1)));
        store.start();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.len(), 0);

        store.stop();
    }

    #[tokio::test]
    async fn get_or_set_runs_the_producer_once_per_key() {
        let store = Arc::new(store_with(10));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .get_or_set("shared", None, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, std::convert::Infallible>(42_u64)
                    })
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.expect("join").expect("value"), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(mutex_lock(&store.inflight, SOURCE, "test").is_empty());

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 7);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_strand_the_flight() {
        let store = Arc::new(store_with(10));
        let holder = store.join_flight("shared").await;

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .get_or_set("shared", None, || async {
                        Ok::<_, std::convert::Infallible>(1_u8)
                    })
                    .await
            })
        };
        // Let the waiter queue behind the holder.
        tokio::task::yield_now().await;
        assert_eq!(
            mutex_lock(&store.inflight, SOURCE, "test")
                .get("shared")
                .map(|flight| flight.waiters),
            Some(2)
        );

        // Release the permit, then cancel the woken waiter before it runs.
        drop(holder);
        waiter.abort();
        assert!(waiter.await.expect_err("aborted").is_cancelled());

        assert!(mutex_lock(&store.inflight, SOURCE, "test").is_empty());
        assert!(!store.has("shared"));
    }

    #[tokio::test]
    async fn waiting_on_another_producer_counts_one_hit() {
        let store = Arc::new(store_with(10));
        let holder = store.join_flight("shared").await;

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .get_or_set("shared", None, || async {
                        Ok::<_, std::convert::Infallible>(2_u8)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        store.set("shared", 1_u8, None);
        drop(holder);

        assert_eq!(waiter.await.expect("join"), Ok(1));
        let stats = store.stats();
        assert_eq!((stats.hits, stats.misses), (1, 0));
    }

    #[tokio::test]
    async fn get_or_set_does_not_store_errors() {
        let store = store_with(10);
        let result = store
            .get_or_set::<u8, _, _, _>("k", None, || async { Err("boom") })
            .await;
        assert_eq!(result, Err("boom"));
        assert!(!store.has("k"));

        let value = store
            .get_or_set::<u8, &str, _, _>("k", None, || async { Ok(5) })
            .await;
        assert_eq!(value, Ok(5));
        assert!(store.has("k"));
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = store_with(10);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store.set("k", 1_i32, None);
        assert_eq!(store.get::<i32>("k"), Some(1));
    }
}
