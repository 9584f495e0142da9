//! Cache Module
//!
//! SQLite-backed key-value caching with TTL expiration.

mod kv;
pub(crate) mod statements;
pub(crate) mod stats;
pub(crate) mod store;


// Re-export public types
pub use kv::Cache;
pub use stats::CacheStats;
