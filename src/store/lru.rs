//! LRU Store Module
//!
//! Main cache engine combining a recency-ordered entry map and an expiration table
//! under a single read-write lock, with byte-budget eviction and TTL expiration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::sweeper::Sweeper;
use crate::store::{EvictionListener, Store, StoreOptions};
use crate::value::{CacheValue, Value};

// == Entry ==
/// A single cached value with the byte size recorded at insertion.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    value: CacheValue,
    size: u64,
}

impl Entry {
    fn new(value: CacheValue) -> Self {
        let size = value.len() as u64;
        Self { value, size }
    }
}

/// Entries removed by a pass, keyed, in removal order.
type Removed = Vec<(String, Entry)>;

// == LRU State ==
/// Structural state, always mutated together under one lock.
pub(crate) struct LruState {
    /// Entries ordered most to least recently used; the byte budget bounds it
    entries: LruCache<String, Entry>,
    /// Absolute expiry per key; absent means never expires
    expires: HashMap<String, Instant>,
    /// Sum of entry sizes
    used_bytes: u64,
}

impl Default for LruState {
    fn default() -> Self {
        Self {
            entries: LruCache::unbounded(),
            expires: HashMap::new(),
            used_bytes: 0,
        }
    }
}

impl fmt::Debug for LruState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruState")
            .field("len", &self.entries.len())
            .field("expiring", &self.expires.len())
            .field("used_bytes", &self.used_bytes)
            .finish()
    }
}

impl LruState {
    fn is_expired(&self, key: &str, now: Instant) -> bool {
        self.expires.get(key).is_some_and(|at| *at <= now)
    }

    fn remove_key(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.pop(key)?;
        self.used_bytes -= entry.size;
        self.expires.remove(key);
        Some(entry)
    }

    // == Insert ==
    /// Inserts or replaces `key` as most recently used and sets its expiry.
    ///
    /// A zero TTL, or one too large to represent, leaves the key without expiry.
    fn insert(&mut self, key: &str, value: CacheValue, ttl: Duration, now: Instant) {
        let entry = Entry::new(value);
        self.used_bytes += entry.size;
        if let Some(old) = self.entries.put(key.to_string(), entry) {
            self.used_bytes -= old.size;
        }

        match Some(ttl)
            .filter(|ttl| !ttl.is_zero())
            .and_then(|ttl| now.checked_add(ttl))
        {
            Some(at) => {
                self.expires.insert(key.to_string(), at);
            }
            None => {
                self.expires.remove(key);
            }
        }
    }

    // == Evict ==
    /// Runs the expiration pass then the capacity pass, returning removed entries.
    ///
    /// Expired keys are removed in no particular order; capacity eviction always takes
    /// the least recently used entry.
    pub(crate) fn evict(&mut self, max_bytes: u64, now: Instant) -> Removed {
        let expired: Vec<String> = self
            .expires
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for key in expired {
            match self.remove_key(&key) {
                Some(entry) => evicted.push((key, entry)),
                None => {
                    self.expires.remove(&key);
                }
            }
        }

        while max_bytes > 0 && self.used_bytes > max_bytes {
            let Some((key, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.expires.remove(&key);
            self.used_bytes -= entry.size;
            evicted.push((key, entry));
        }

        evicted
    }

    /// Empties the state, returning entries from least to most recently used.
    fn drain(&mut self) -> Removed {
        self.expires.clear();
        self.used_bytes = 0;
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some(item) = self.entries.pop_lru() {
            drained.push(item);
        }
        drained
    }
}

// == Shared Engine ==
/// State shared with the background sweeper.
pub(crate) struct LruShared {
    state: RwLock<LruState>,
    max_bytes: u64,
    on_evicted: Option<Arc<dyn EvictionListener>>,
}

impl LruShared {
    // == Run Eviction Pass ==
    /// Evicts under the write lock, then notifies the listener outside it.
    ///
    /// Returns the number of entries removed.
    pub(crate) fn run_eviction_pass(&self) -> usize {
        let evicted = {
            let mut state = self.state.write();
            state.evict(self.max_bytes, Instant::now())
        };
        let count = evicted.len();
        self.notify(evicted);
        count
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            state: RwLock::new(LruState::default()),
            max_bytes: 0,
            on_evicted: None,
        }
    }

    fn notify(&self, evicted: Removed) {
        if let Some(listener) = &self.on_evicted {
            for (key, entry) in &evicted {
                listener.on_evicted(key, &entry.value);
            }
        }
    }
}

// == LRU Store ==
/// Byte-budgeted LRU store with per-key TTL.
pub struct LruStore {
    shared: Arc<LruShared>,
    /// Background sweep task; taken on close
    sweeper: Mutex<Option<Sweeper>>,
}

impl LruStore {
    // == Constructor ==
    /// Creates a new store and starts its background sweep.
    ///
    /// # Errors
    /// Fails on a zero cleanup interval or if the sweep thread cannot be spawned.
    pub fn new(options: StoreOptions) -> Result<Self> {
        options.validate()?;

        let shared = Arc::new(LruShared {
            state: RwLock::new(LruState::default()),
            max_bytes: options.max_bytes,
            on_evicted: options.on_evicted,
        });
        let sweeper = Sweeper::spawn(Arc::downgrade(&shared), options.cleanup_interval)?;

        Ok(Self {
            shared,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Returns whether `key` is present, without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.shared.state.read().entries.contains(key)
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        self.shared
            .state
            .read()
            .entries
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Runs the expiration and capacity passes now.
    pub fn run_eviction_pass(&self) -> usize {
        self.shared.run_eviction_pass()
    }
}

impl Store for LruStore {
    // == Get ==
    /// Retrieves a value by key and moves it to the front.
    ///
    /// An entry whose expiry has passed is removed and reported as a miss.
    fn get(&self, key: &str) -> Option<CacheValue> {
        let mut expired = None;
        let value = {
            let mut state = self.shared.state.write();
            if state.is_expired(key, Instant::now()) {
                expired = state.remove_key(key);
                None
            } else {
                state.entries.get(key).map(|entry| entry.value.clone())
            }
        };

        if let Some(entry) = expired {
            debug!("Key {} expired on access", key);
            self.shared.notify(vec![(key.to_string(), entry)]);
        }
        value
    }

    // == Set With Expiration ==
    fn set_with_expiration(
        &self,
        key: &str,
        value: Option<CacheValue>,
        ttl: Duration,
    ) -> Result<()> {
        let Some(value) = value else {
            self.delete(key);
            return Ok(());
        };

        let now = Instant::now();
        let evicted = {
            let mut state = self.shared.state.write();
            state.insert(key, value, ttl, now);
            state.evict(self.shared.max_bytes, now)
        };

        if !evicted.is_empty() {
            debug!("Evicted {} entries after setting {}", evicted.len(), key);
        }
        self.shared.notify(evicted);
        Ok(())
    }

    // == Delete ==
    fn delete(&self, key: &str) -> bool {
        self.shared.state.write().remove_key(key).is_some()
    }

    // == Clear ==
    /// Removes every entry, then notifies once per removed entry.
    fn clear(&self) {
        let cleared = self.shared.state.write().drain();
        self.shared.notify(cleared);
    }

    // == Length ==
    fn len(&self) -> usize {
        self.shared.state.read().entries.len()
    }

    fn used_bytes(&self) -> u64 {
        self.shared.state.read().used_bytes
    }

    // == Close ==
    /// Stops the background sweep and drops all entries without notification.
    fn close(&self) {
        let Some(sweeper) = self.sweeper.lock().take() else {
            warn!("Store already closed");
            return;
        };
        sweeper.shutdown();

        let mut state = self.shared.state.write();
        *state = LruState::default();
    }
}

impl Drop for LruStore {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.shutdown();
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ByteView;
    use std::thread::sleep;

    fn store(max_bytes: u64) -> LruStore {
        LruStore::new(StoreOptions {
            max_bytes,
            ..StoreOptions::default()
        })
        .unwrap()
    }

    fn bytes(len: usize) -> Option<CacheValue> {
        Some(ByteView::from(vec![b'x'; len]).into())
    }

    fn text(value: &str) -> Option<CacheValue> {
        Some(ByteView::from(value).into())
    }

    fn get_text(store: &LruStore, key: &str) -> Option<String> {
        store
            .get(key)
            .and_then(|v| v.as_bytes().map(ByteView::as_string))
    }

    #[derive(Default)]
    struct Recorder {
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl EvictionListener for Recorder {
        fn on_evicted(&self, key: &str, _value: &CacheValue) {
            self.seen.lock().unwrap().push(key.to_string());
        }
    }

    fn recording_store(max_bytes: u64) -> (LruStore, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let store = LruStore::new(StoreOptions {
            max_bytes,
            on_evicted: Some(recorder.clone()),
            ..StoreOptions::default()
        })
        .unwrap();
        (store, recorder)
    }

    #[test]
    fn test_store_new() {
        let store = store(0);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.used_bytes(), 0);
    }

    #[test]
    fn test_store_set_and_get() {
        let store = store(0);

        store.set("key1", text("value1")).unwrap();

        assert_eq!(get_text(&store, "key1").as_deref(), Some("value1"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.used_bytes(), 6);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let store = store(0);
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn test_store_overwrite_adjusts_size() {
        let store = store(0);

        store.set("key1", bytes(10)).unwrap();
        store.set("key1", bytes(4)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.used_bytes(), 4);
    }

    #[test]
    fn test_store_set_none_deletes() {
        let store = store(0);

        store.set("key1", text("value1")).unwrap();
        store.set("key1", None).unwrap();

        assert!(store.is_empty());
        assert_eq!(store.used_bytes(), 0);
    }

    #[test]
    fn test_store_delete() {
        let store = store(0);

        store.set("key1", text("value1")).unwrap();

        assert!(store.delete("key1"));
        assert!(!store.delete("key1"));
        assert!(store.get("key1").is_none());
        assert_eq!(store.used_bytes(), 0);
    }

    #[test]
    fn test_store_delete_does_not_notify() {
        let (store, recorder) = recording_store(0);

        store.set("key1", text("value1")).unwrap();
        store.delete("key1");

        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_store_byte_budget_scenario() {
        let store = store(20);

        store.set("a", bytes(10)).unwrap();
        store.set("b", bytes(10)).unwrap();
        assert_eq!(store.used_bytes(), 20);
        assert_eq!(store.len(), 2);

        store.set("c", bytes(5)).unwrap();

        assert!(!store.contains("a"));
        assert!(store.contains("b"));
        assert!(store.contains("c"));
        assert_eq!(store.used_bytes(), 15);
    }

    #[test]
    fn test_store_lru_touch_on_get() {
        let store = store(30);

        store.set("key1", bytes(10)).unwrap();
        store.set("key2", bytes(10)).unwrap();
        store.set("key3", bytes(10)).unwrap();

        // Access key1 to make it most recently used
        assert!(store.get("key1").is_some());

        // Adding key4 should evict key2 (now oldest)
        store.set("key4", bytes(10)).unwrap();

        assert!(store.contains("key1"));
        assert!(!store.contains("key2"));
        assert_eq!(store.keys(), vec!["key4", "key1", "key3"]);
    }

    #[test]
    fn test_store_oversized_entry_evicts_everything() {
        let (store, recorder) = recording_store(10);

        store.set("small", bytes(5)).unwrap();
        store.set("huge", bytes(50)).unwrap();

        assert!(store.is_empty());
        assert_eq!(store.used_bytes(), 0);
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["small", "huge"]);
    }

    #[test]
    fn test_store_unbounded_never_evicts() {
        let store = store(0);

        for i in 0..100 {
            store.set(&format!("key{i}"), bytes(1024)).unwrap();
        }

        assert_eq!(store.len(), 100);
        assert_eq!(store.used_bytes(), 100 * 1024);
    }

    #[test]
    fn test_store_ttl_expiration_on_access() {
        let (store, recorder) = recording_store(0);

        store
            .set_with_expiration("key1", text("value1"), Duration::from_millis(50))
            .unwrap();
        assert!(store.get("key1").is_some());

        sleep(Duration::from_millis(80));

        assert!(store.get("key1").is_none());
        assert!(store.is_empty());
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["key1"]);
    }

    #[test]
    fn test_store_expired_entry_counts_until_pass() {
        let store = store(0);

        store
            .set_with_expiration("key1", text("value1"), Duration::from_millis(30))
            .unwrap();
        store.set("key2", text("value2")).unwrap();

        sleep(Duration::from_millis(60));

        assert_eq!(store.len(), 2);
        assert_eq!(store.run_eviction_pass(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.used_bytes(), 6);
    }

    #[test]
    fn test_store_mutation_runs_expiration_pass() {
        let store = store(0);

        store
            .set_with_expiration("old", text("value"), Duration::from_millis(30))
            .unwrap();
        sleep(Duration::from_millis(60));
        store.set("new", text("value")).unwrap();

        assert!(!store.contains("old"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_zero_ttl_clears_prior_expiration() {
        let store = store(0);

        store
            .set_with_expiration("key1", text("v1"), Duration::from_millis(30))
            .unwrap();
        store.set("key1", text("v2")).unwrap();

        sleep(Duration::from_millis(60));

        assert_eq!(get_text(&store, "key1").as_deref(), Some("v2"));
    }

    #[test]
    fn test_store_positive_ttl_overwrites_expiration() {
        let store = store(0);

        store
            .set_with_expiration("key1", text("v1"), Duration::from_millis(30))
            .unwrap();
        store
            .set_with_expiration("key1", text("v2"), Duration::from_secs(60))
            .unwrap();

        sleep(Duration::from_millis(60));

        assert_eq!(get_text(&store, "key1").as_deref(), Some("v2"));
    }

    #[test]
    fn test_store_huge_ttl_never_expires() {
        let store = store(0);

        store
            .set_with_expiration("key1", text("v1"), Duration::from_millis(30))
            .unwrap();
        store
            .set_with_expiration("key1", text("v2"), Duration::MAX)
            .unwrap();

        sleep(Duration::from_millis(60));

        assert_eq!(store.run_eviction_pass(), 0);
        assert_eq!(get_text(&store, "key1").as_deref(), Some("v2"));
        assert!(store.shared.state.read().expires.is_empty());
    }

    #[test]
    fn test_store_clear_notifies_each_entry() {
        let (store, recorder) = recording_store(0);

        store.set("a", text("1")).unwrap();
        store
            .set_with_expiration("b", text("2"), Duration::from_secs(60))
            .unwrap();

        store.clear();

        assert_eq!(store.len(), 0);
        assert_eq!(store.used_bytes(), 0);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_none());

        let mut seen = recorder.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_store_listener_may_reenter() {
        let store = Arc::new(store(0));
        let inner = Arc::downgrade(&store);
        let reentrant = LruStore::new(StoreOptions {
            max_bytes: 4,
            on_evicted: Some(Arc::new(move |key: &str, _: &CacheValue| {
                if let Some(other) = inner.upgrade() {
                    other.set(key, Some(ByteView::from(key).into())).unwrap();
                }
            })),
            ..StoreOptions::default()
        })
        .unwrap();

        reentrant.set("a", bytes(4)).unwrap();
        reentrant.set("b", bytes(4)).unwrap();

        assert!(store.contains("a"));
        assert!(!reentrant.contains("a"));
    }

    #[test]
    fn test_store_background_sweep_removes_expired() {
        let store = LruStore::new(StoreOptions {
            max_bytes: 0,
            cleanup_interval: Duration::from_millis(20),
            on_evicted: None,
        })
        .unwrap();

        store
            .set_with_expiration("key1", text("value1"), Duration::from_millis(30))
            .unwrap();

        sleep(Duration::from_millis(150));

        assert_eq!(store.len(), 0);
        assert_eq!(store.used_bytes(), 0);
    }

    #[test]
    fn test_store_close_releases_entries() {
        let store = store(0);

        store.set("key1", text("value1")).unwrap();
        store.close();

        assert_eq!(store.len(), 0);
        assert_eq!(store.used_bytes(), 0);

        // Second close is diagnosed, not fatal
        store.close();
    }

    #[test]
    fn test_store_concurrent_writers_keep_accounting() {
        let store = Arc::new(store(1000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("k{}", (t * 31 + i) % 64);
                        match i % 3 {
                            0 => store.set(&key, bytes(i % 50 + 1)).unwrap(),
                            1 => {
                                store.get(&key);
                            }
                            _ => {
                                store.delete(&key);
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = store.shared.state.read();
        let sum: u64 = state.entries.iter().map(|(_, e)| e.size).sum();
        assert_eq!(state.used_bytes, sum);
        assert!(state.used_bytes <= 1000);
        assert!(state.expires.keys().all(|k| state.entries.contains(k)));
    }
}
