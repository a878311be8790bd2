//! Configuration Module
//!
//! Handles building cache options, with an optional layer reading environment variables.

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::store::{
    EvictionListener, StoreKind, StoreOptions, DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_BYTES,
};

/// Default cache name used in log spans
pub const DEFAULT_CACHE_NAME: &str = "default";

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Clone)]
pub struct CacheOptions {
    /// Name recorded on the cache's tracing span
    pub name: String,
    /// Store engine to build on first use
    pub backend: StoreKind,
    /// Byte budget, 0 = unbounded
    pub max_bytes: u64,
    /// Interval between background sweeps
    pub cleanup_interval: Duration,
    /// Optional eviction listener
    pub on_evicted: Option<Arc<dyn EvictionListener>>,
}

impl CacheOptions {
    /// Creates options by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_NAME` - Span name (default: "default")
    /// - `CACHE_BACKEND` - `lru` or `lru2` (default: lru)
    /// - `CACHE_MAX_BYTES` - Byte budget, 0 for unbounded (default: 8 MiB)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Sweep interval in milliseconds (default: 60000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name: env::var("CACHE_NAME").unwrap_or(defaults.name),
            backend: env::var("CACHE_BACKEND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.backend),
            max_bytes: env::var("CACHE_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_bytes),
            cleanup_interval: env::var("CACHE_CLEANUP_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.cleanup_interval),
            on_evicted: None,
        }
    }

    /// Sets the eviction listener.
    pub fn with_listener(mut self, listener: impl EvictionListener + 'static) -> Self {
        self.on_evicted = Some(Arc::new(listener));
        self
    }

    /// Rejects settings the store engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.store_options().validate()
    }

    /// Engine options derived from these cache options.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_bytes: self.max_bytes,
            cleanup_interval: self.cleanup_interval,
            on_evicted: self.on_evicted.clone(),
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_CACHE_NAME.to_string(),
            backend: StoreKind::Lru,
            max_bytes: DEFAULT_MAX_BYTES,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            on_evicted: None,
        }
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("max_bytes", &self.max_bytes)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("on_evicted", &self.on_evicted.is_some())
            .finish()
    }
}
