//! kvcache - An embedded TTL key-value cache
//!
//! Stores string values in a single SQLite table with optional expiry.
//! Expired entries are hidden on read and removed by a background reaper.
//!
//! ```no_run
//! use std::time::Duration;
//! use kvcache::Cache;
//!
//! # fn main() -> kvcache::Result<()> {
//! let cache = Cache::new("sessions", Duration::from_secs(300))?;
//! cache.set_with_expiry("otp:alice", "482913", Duration::from_secs(600))?;
//! assert_eq!(cache.get("otp:alice")?, "482913");
//! cache.close()?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub(crate) mod tasks;

pub use cache::{Cache, CacheStats};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::ReaperState;
