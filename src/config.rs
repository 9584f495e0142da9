//! Configuration Module
//!
//! Options for opening a cache. The crate reads no environment variables;
//! the host application fills this struct from wherever it keeps settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default directory holding `<name>.db` files
pub const DEFAULT_DATA_DIR: &str = "db";

/// Cache configuration parameters.
///
/// Deserializes with per-field defaults, so a partial table in the host's
/// config file is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the database files
    pub data_dir: PathBuf,
    /// Use an ephemeral in-memory database instead of a file
    pub in_memory: bool,
    /// Interval between background sweeps, in milliseconds
    pub cleanup_interval_ms: u64,
    /// How long a statement waits on a locked database, in milliseconds
    pub busy_timeout_ms: u64,
    /// SQLite page cache size, in pages
    pub cache_size: i64,
}

impl CacheConfig {
    /// Returns the sweep interval as a Duration.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    /// Sets the sweep interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the directory database files are created in.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Switches to an in-memory database.
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            in_memory: false,
            cleanup_interval_ms: 5 * 60 * 1000,
            busy_timeout_ms: 10_000,
            cache_size: 10_000,
        }
    }
}
