//! Cache Statistics Module
//!
//! Point-in-time snapshot of façade usage counters and store occupancy.

use serde::Serialize;

// == Cache Stats ==
/// Read-only statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Whether the store has been built
    pub initialized: bool,
    /// Whether the cache has been closed
    pub closed: bool,
    /// Number of successful retrievals
    pub hits: u64,
    /// Number of failed retrievals (missing, expired, closed, or wrong type)
    pub misses: u64,
    /// Current number of entries in the store
    pub size: usize,
    /// Current sum of entry sizes in bytes
    pub used_bytes: u64,
    /// hits / (hits + misses), 0.0 before any request
    pub hit_rate: f64,
}

impl CacheStats {
    // == Constructor ==
    /// Builds a snapshot, deriving the hit rate from the counters.
    pub fn new(
        initialized: bool,
        closed: bool,
        hits: u64,
        misses: u64,
        size: usize,
        used_bytes: u64,
    ) -> Self {
        Self {
            initialized,
            closed,
            hits,
            misses,
            size,
            used_bytes,
            hit_rate: hit_rate(hits, misses),
        }
    }
}

// == Hit Rate ==
/// Returns hits / (hits + misses), or 0.0 if no requests have been made.
fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
