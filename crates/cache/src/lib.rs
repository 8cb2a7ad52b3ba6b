//! Cache store used by the response cache and invalidation behaviors.
//!
//! The store has no transactional coupling to persistence. Callers get
//! consistency by invalidating only after a write has committed.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{CacheError, Result};
pub use memory::InMemoryCacheStore;
pub use store::CacheStore;
