//! Cache Module
//!
//! Façade over a store engine: lazy construction, hit/miss accounting and a closed
//! state after which every operation is a logged no-op.

mod stats;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, error, info, info_span, warn, Span};

use crate::config::CacheOptions;
use crate::error::{CacheError, Result};
use crate::store::{new_store, Store};
use crate::value::{ByteView, CacheValue};

pub use stats::CacheStats;

// == Cache ==
/// Thread-safe byte cache.
///
/// The store engine is built on the first operation, exactly once even under
/// concurrent first use. After [`Cache::close`] all operations report a miss or
/// no-op instead of rebuilding the store. Dropping an unclosed cache closes its store.
///
/// # Example
/// ```
/// use bytecache::{ByteView, Cache, CacheOptions};
///
/// let cache = Cache::new(CacheOptions::default()).unwrap();
/// cache.add("greeting", ByteView::from("hello"));
/// assert_eq!(cache.get("greeting").unwrap().as_string(), "hello");
/// cache.close();
/// ```
pub struct Cache {
    options: CacheOptions,
    store: OnceCell<Box<dyn Store>>,
    initialized: AtomicBool,
    closed: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Set once the store has been closed; serializes close against a first build
    released: Mutex<bool>,
    /// Span every operation and the store's sweeper log under
    span: Span,
}

impl Cache {
    // == Constructor ==
    /// Creates a cache; the store itself is built lazily.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the options cannot produce a working store.
    pub fn new(options: CacheOptions) -> Result<Self> {
        options.validate()?;
        let span = info_span!("cache", name = %options.name);
        Ok(Self {
            options,
            store: OnceCell::new(),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            released: Mutex::new(false),
            span,
        })
    }

    /// Creates a cache logging under `span` instead of its own.
    pub fn with_span(options: CacheOptions, span: Span) -> Result<Self> {
        let mut cache = Self::new(options)?;
        cache.span = span;
        Ok(cache)
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    // == Open Store ==
    /// Returns the store, building it on first use, or `None` once closed.
    fn open_store(&self) -> Option<&dyn Store> {
        if self.closed.load(Ordering::Acquire) {
            error!("{}", CacheError::Closed);
            return None;
        }
        let mut built = false;
        let store = match self.store.get_or_try_init(|| {
            built = true;
            self.build_store()
        }) {
            Ok(store) => &**store,
            Err(err) => {
                error!("Failed to initialize cache store: {}", err);
                return None;
            }
        };

        if built && !self.finish_init(store) {
            return None;
        }
        Some(store)
    }

    fn build_store(&self) -> Result<Box<dyn Store>> {
        new_store(self.options.backend, self.options.store_options())
    }

    /// Marks a freshly built store as live, unless `close` ran while it was being
    /// built, in which case the store is closed and false is returned.
    fn finish_init(&self, store: &dyn Store) -> bool {
        let mut released = self.released.lock();
        if self.closed.load(Ordering::Acquire) {
            if !*released {
                store.close();
                *released = true;
            }
            warn!("Cache closed while its store was being built");
            return false;
        }

        self.initialized.store(true, Ordering::Release);
        info!(
            "Cache initialized: backend={}, max_bytes={}",
            self.options.backend, self.options.max_bytes
        );
        true
    }

    // == Get ==
    /// Retrieves a value, counting a hit or a miss.
    ///
    /// A stored value that is not a byte view counts as a miss.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let _entered = self.span.enter();
        let Some(store) = self.open_store() else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        match store.get(key) {
            Some(CacheValue::Bytes(view)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(view)
            }
            Some(CacheValue::Opaque(_)) => {
                warn!(
                    "{}",
                    CacheError::TypeMismatch {
                        key: key.to_string()
                    }
                );
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    // == Add ==
    /// Stores a value without expiration. Returns false if nothing was stored.
    pub fn add(&self, key: &str, value: ByteView) -> bool {
        let _entered = self.span.enter();
        let Some(store) = self.open_store() else {
            warn!("Attempted to add {} to a closed cache", key);
            return false;
        };

        match store.set(key, Some(value.into())) {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to add {}: {}", key, err);
                false
            }
        }
    }

    // == Add With Expiration ==
    /// Stores a value that expires at `expires_at`.
    ///
    /// An expiry that is not in the future is rejected and nothing is stored.
    pub fn add_with_expiration(
        &self,
        key: &str,
        value: ByteView,
        expires_at: DateTime<Utc>,
    ) -> bool {
        let _entered = self.span.enter();
        let Some(store) = self.open_store() else {
            warn!("Attempted to add {} with expiration to a closed cache", key);
            return false;
        };

        let ttl = match (expires_at - Utc::now()).to_std() {
            Ok(ttl) if !ttl.is_zero() => ttl,
            _ => {
                warn!("Expiration for {} must be in the future: {}", key, expires_at);
                return false;
            }
        };

        match store.set_with_expiration(key, Some(value.into()), ttl) {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to add {} with expiration: {}", key, err);
                false
            }
        }
    }

    // == Delete ==
    /// Removes a key, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let _entered = self.span.enter();
        let Some(store) = self.open_store() else {
            return false;
        };

        let deleted = store.delete(key);
        if deleted {
            debug!("Key {} deleted", key);
        } else {
            debug!("Key {} not found for deletion", key);
        }
        deleted
    }

    // == Clear ==
    /// Removes every entry and resets the hit/miss counters.
    pub fn clear(&self) {
        let _entered = self.span.enter();
        let Some(store) = self.open_store() else {
            return;
        };

        store.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        info!("Cache cleared and statistics reset");
    }

    // == Length ==
    /// Number of live entries, 0 once closed.
    pub fn len(&self) -> usize {
        let _entered = self.span.enter();
        self.open_store().map_or(0, |store| store.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Close ==
    /// Closes the cache and releases its store.
    ///
    /// Returns false if the cache was already closed.
    pub fn close(&self) -> bool {
        let _entered = self.span.enter();
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Cache is already closed");
            return false;
        }

        {
            let mut released = self.released.lock();
            if let Some(store) = self.store.get() {
                if !*released {
                    store.close();
                    *released = true;
                }
            }
            self.initialized.store(false, Ordering::Release);
        }
        info!(
            "Cache closed: hits={}, misses={}",
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed)
        );
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // == Stats ==
    /// Returns a statistics snapshot without building the store.
    pub fn stats(&self) -> CacheStats {
        let initialized = self.initialized.load(Ordering::Acquire);
        let closed = self.is_closed();
        let (size, used_bytes) = match self.store.get() {
            Some(store) if initialized && !closed => (store.len(), store.used_bytes()),
            _ => (0, 0),
        };

        CacheStats::new(
            initialized,
            closed,
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            size,
            used_bytes,
        )
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if *self.released.get_mut() {
            return;
        }
        if let Some(store) = self.store.get_mut() {
            let _entered = self.span.enter();
            debug!("Cache dropped without close, closing its store");
            store.close();
        }
    }
}
