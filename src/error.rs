//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Steady-state operations never surface these to callers; misses and no-ops are
/// reported as `false`/`None`. Only construction can fail.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Rejected configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation attempted on a closed cache
    #[error("Cache is closed")]
    Closed,

    /// Stored value is not a byte view
    #[error("Type mismatch for key: {key}")]
    TypeMismatch { key: String },

    /// Background sweep thread could not be started
    #[error("Failed to start sweeper: {0}")]
    Sweeper(#[from] std::io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
