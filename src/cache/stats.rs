//! Cache Statistics Module
//!
//! Tracks lookup outcomes and reaper activity.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that returned a value
    pub hits: u64,
    /// Lookups on keys that were never set or were deleted
    pub misses: u64,
    /// Lookups on keys whose TTL had lapsed but were not yet swept
    pub expired_reads: u64,
    /// Completed reaper sweeps
    pub sweeps: u64,
    /// Reaper sweeps that failed
    pub failed_sweeps: u64,
    /// Rows physically removed by the reaper
    pub purged: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Expired reads count as misses. Returns 0.0 if no lookups were made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.expired_reads;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Lock-free counters shared by the cache API and the reaper thread.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    expired_reads: AtomicU64,
    sweeps: AtomicU64,
    failed_sweeps: AtomicU64,
    purged: AtomicU64,
}

impl StatsRecorder {
    /// Increments the hit counter.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the miss counter.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the counter of reads that found a lapsed entry.
    pub fn record_expired_read(&self) {
        self.expired_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful sweep that removed `removed` rows.
    pub fn record_sweep(&self, removed: usize) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.purged.fetch_add(removed as u64, Ordering::Relaxed);
    }

    /// Increments the failed sweep counter.
    pub fn record_failed_sweep(&self) {
        self.failed_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Copies the current counter values.
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_reads: self.expired_reads.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            failed_sweeps: self.failed_sweeps.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
        }
    }
}
