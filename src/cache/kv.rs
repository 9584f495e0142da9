//! Cache API Module
//!
//! The public key-value surface. Every call runs synchronously against the
//! durable store; expiry is enforced on read and by the background reaper.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::cache::statements::{self, Lookup};
use crate::cache::stats::{CacheStats, StatsRecorder};
use crate::cache::store::Store;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_reaper, sweep, ReaperHandle, ReaperState};

// == Cache ==
/// A named TTL key-value cache backed by one SQLite database.
///
/// `Cache` is `Send + Sync`; share it with `Arc<Cache>`. Writes to the same
/// key are ordered by SQLite and the last writer wins. The reaper sweeps
/// through a connection of its own.
#[derive(Debug)]
pub struct Cache {
    name: String,
    // Declared before `store` so a dropped cache stops sweeping first
    reaper: ReaperHandle,
    store: Store,
    stats: Arc<StatsRecorder>,
}

impl Cache {
    // == Constructors ==
    /// Opens `db/<name>.db` and starts a reaper sweeping every
    /// `cleanup_interval`.
    pub fn new(name: &str, cleanup_interval: Duration) -> Result<Self> {
        Self::with_config(
            name,
            CacheConfig::default().with_cleanup_interval(cleanup_interval),
        )
    }

    /// Opens an ephemeral in-memory cache.
    pub fn in_memory(cleanup_interval: Duration) -> Result<Self> {
        Self::with_config(
            "memory",
            CacheConfig::default()
                .with_cleanup_interval(cleanup_interval)
                .in_memory(),
        )
    }

    /// Opens a cache with full control over storage options.
    pub fn with_config(name: &str, config: CacheConfig) -> Result<Self> {
        let store = Store::open(name, &config)?;
        let stats = Arc::new(StatsRecorder::default());
        let reaper = spawn_reaper(
            name,
            store.reopen()?,
            Arc::clone(&stats),
            config.cleanup_interval(),
        )?;

        info!("Cache {} initialized at {}", name, store.location());
        Ok(Self {
            name: name.to_string(),
            reaper,
            store,
            stats,
        })
    }

    // == Get ==
    /// Retrieves the value stored under `key`.
    ///
    /// Fails with [`CacheError::NotFound`] if the key was never set or was
    /// deleted, and with [`CacheError::Expired`] if its TTL has lapsed but the
    /// reaper has not removed it yet. A miss leaves the row untouched.
    pub fn get(&self, key: &str) -> Result<String> {
        let now_ms = Utc::now().timestamp_millis();
        match statements::get_live(&self.store.conn(), key, now_ms)? {
            Lookup::Live(value) => {
                self.stats.record_hit();
                Ok(value)
            }
            Lookup::Expired => {
                self.stats.record_expired_read();
                Err(CacheError::Expired(key.to_string()))
            }
            Lookup::Missing => {
                self.stats.record_miss();
                Err(CacheError::NotFound(key.to_string()))
            }
        }
    }

    // == Set ==
    /// Stores `value` under `key` with no expiry.
    ///
    /// Overwrites any previous value and clears any previous expiry.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        statements::upsert_no_expiry(&self.store.conn(), key, value)
    }

    /// Stores `value` under `key`, expiring `ttl` from now.
    ///
    /// A zero `ttl` stores the entry as already expired: reads report
    /// [`CacheError::Expired`] and the next sweep removes it.
    pub fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        statements::upsert_with_expiry(&self.store.conn(), key, value, expires_at)
    }

    // == Delete ==
    /// Removes `key`. Deleting an absent key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        let removed = statements::delete(&self.store.conn(), key)?;
        if removed == 0 {
            debug!("Delete on absent key {} in cache {}", key, self.name);
        }
        Ok(())
    }

    // == Maintenance ==
    /// Runs a sweep now, outside the reaper schedule.
    ///
    /// Unlike reaper sweeps, a failure here is returned to the caller.
    pub fn purge_expired(&self) -> Result<usize> {
        sweep(&self.store, &self.stats)
    }

    /// Returns the number of stored rows, including expired rows that have
    /// not been swept yet.
    pub fn stored_rows(&self) -> Result<u64> {
        self.store.row_count()
    }

    /// Returns a snapshot of lookup and sweep counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Returns the name the cache was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reports whether the background reaper is still running.
    pub fn reaper_state(&self) -> ReaperState {
        self.reaper.state()
    }

    // == Close ==
    /// Stops the reaper, then flushes and closes the store.
    ///
    /// The reaper is fully stopped, and its connection closed, before the
    /// store is released, so no sweep can run against a closed database.
    pub fn close(self) -> Result<()> {
        let Cache {
            name,
            mut reaper,
            store,
            stats: _,
        } = self;

        reaper.stop();
        store.close()?;

        info!("Cache {} closed", name);
        Ok(())
    }
}
