use thiserror::Error;

/// Errors raised by a cache backend.
///
/// A missing key is never an error; `get` returns `None` and deletes
/// report whether anything was removed.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store failed or is unreachable.
    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
