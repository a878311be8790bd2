//! Store Module
//!
//! The eviction/expiration engine behind the cache façade, plus the factory that
//! selects a backend by kind.

mod lru;
mod sweeper;


use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CacheError, Result};
use crate::value::CacheValue;

pub use self::lru::LruStore;

// == Public Constants ==
/// Default byte budget (8 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 8 * 1024 * 1024;

/// Default interval between background sweeps
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

// == Store Trait ==
/// Key/value engine with size-bounded eviction and per-key expiration.
///
/// A miss is a normal outcome, not an error. Implementations must be safe to share
/// between threads.
pub trait Store: Send + Sync {
    /// Returns the value for `key` and marks it most recently used.
    fn get(&self, key: &str) -> Option<CacheValue>;

    /// Stores `value` without expiration. `None` deletes the key.
    fn set(&self, key: &str, value: Option<CacheValue>) -> Result<()> {
        self.set_with_expiration(key, value, Duration::ZERO)
    }

    /// Stores `value`, expiring it after `ttl`. A zero `ttl` means no expiration and
    /// clears any expiration previously recorded for the key. `None` deletes the key.
    fn set_with_expiration(&self, key: &str, value: Option<CacheValue>, ttl: Duration)
        -> Result<()>;

    /// Removes `key`, returning whether it was present.
    fn delete(&self, key: &str) -> bool;

    /// Removes every entry, notifying the eviction listener once per entry.
    fn clear(&self);

    /// Number of live entries, including expired ones not yet swept.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the sizes of all live entries.
    fn used_bytes(&self) -> u64;

    /// Stops background work and releases held entries.
    fn close(&self);
}

// == Eviction Listener ==
/// Receives entries removed by expiry, capacity eviction or `clear`.
///
/// Notifications are delivered after the store lock has been released, so a
/// listener may call back into the store.
pub trait EvictionListener: Send + Sync {
    fn on_evicted(&self, key: &str, value: &CacheValue);
}

impl<F> EvictionListener for F
where
    F: Fn(&str, &CacheValue) + Send + Sync,
{
    fn on_evicted(&self, key: &str, value: &CacheValue) {
        self(key, value)
    }
}

// == Store Kind ==
/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoreKind {
    /// Least-recently-used engine
    #[default]
    #[serde(rename = "lru")]
    Lru,
    /// Two-queue, promote-on-second-access engine
    #[serde(rename = "lru2")]
    TwoQueue,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Lru => f.write_str("lru"),
            StoreKind::TwoQueue => f.write_str("lru2"),
        }
    }
}

impl FromStr for StoreKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(StoreKind::Lru),
            "lru2" => Ok(StoreKind::TwoQueue),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown store kind: {other}"
            ))),
        }
    }
}

// == Store Options ==
/// Engine construction parameters.
#[derive(Clone)]
pub struct StoreOptions {
    /// Byte budget, 0 = unbounded
    pub max_bytes: u64,
    /// Interval between background sweeps, must be non-zero
    pub cleanup_interval: Duration,
    /// Optional eviction listener
    pub on_evicted: Option<Arc<dyn EvictionListener>>,
}

impl StoreOptions {
    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cleanup_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "cleanup interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            on_evicted: None,
        }
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("max_bytes", &self.max_bytes)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("on_evicted", &self.on_evicted.is_some())
            .finish()
    }
}

// == Factory ==
/// Builds the store engine for `kind`.
///
/// The two-queue engine is not bundled with this crate; asking for it yields the LRU
/// engine with a warning.
pub fn new_store(kind: StoreKind, options: StoreOptions) -> Result<Box<dyn Store>> {
    match kind {
        StoreKind::Lru => Ok(Box::new(LruStore::new(options)?)),
        StoreKind::TwoQueue => {
            warn!("Store kind {} is not available, falling back to lru", kind);
            Ok(Box::new(LruStore::new(options)?))
        }
    }
}
