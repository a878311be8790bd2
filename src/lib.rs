//! Bytecache - An in-process, byte-budgeted cache
//!
//! Stores immutable byte values under string keys with LRU eviction against a byte
//! budget and per-entry TTL expiration, behind a lazily initialized façade.

pub mod cache;
pub mod config;
pub mod error;
pub mod store;
pub mod value;

pub use cache::{Cache, CacheStats};
pub use config::CacheOptions;
pub use error::{CacheError, Result};
pub use store::{new_store, EvictionListener, LruStore, Store, StoreKind, StoreOptions};
pub use value::{ByteView, CacheValue, Value};
