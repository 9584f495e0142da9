//! Expired Row Reaper
//!
//! Background task that periodically deletes rows whose TTL has lapsed, so
//! entries that are never read again do not accumulate on disk.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Builder;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::statements;
use crate::cache::stats::StatsRecorder;
use crate::cache::store::Store;
use crate::error::Result;

/// Shortest accepted sweep interval
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle of a reaper. There is no pause or resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaperState {
    /// Ticking and sweeping
    Running,
    /// Shut down; no further sweeps
    Stopped,
}

// == Sweep ==
/// Runs one purge pass against `store` and records the outcome.
///
/// Returns the number of rows removed.
pub fn sweep(store: &Store, stats: &StatsRecorder) -> Result<usize> {
    let now_ms = Utc::now().timestamp_millis();
    let result = statements::purge_expired(&store.conn(), now_ms);

    match &result {
        Ok(removed) => stats.record_sweep(*removed),
        Err(_) => stats.record_failed_sweep(),
    }
    result
}

// == Reaper Handle ==
/// Owner of a running reaper thread.
///
/// Dropping the handle stops the reaper the same way [`ReaperHandle::stop`]
/// does.
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ReaperHandle {
    /// Signals the reaper to stop and waits for its thread to exit.
    ///
    /// A sweep already in flight finishes first; no sweep starts after this
    /// returns. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The receiver is gone only if the thread already exited.
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Reaper thread panicked before shutdown");
            }
        }
    }

    /// Reports whether the reaper thread is still looping.
    pub fn state(&self) -> ReaperState {
        match &self.thread {
            Some(thread) if !thread.is_finished() => ReaperState::Running,
            _ => ReaperState::Stopped,
        }
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// == Spawn ==
/// Starts a reaper that sweeps `store` every `interval`.
///
/// The reaper owns `store`, a connection of its own, so callers reading
/// through another connection are not held up by a sweep. It runs on its own
/// thread, driven by a single-threaded tokio runtime, so it works whether or
/// not the caller is inside a runtime. The first sweep happens one interval
/// after start. A failed sweep is logged and the loop carries on; the rows
/// stay candidates for the next tick. The connection is closed when the
/// reaper stops.
pub fn spawn_reaper(
    name: &str,
    store: Store,
    stats: Arc<StatsRecorder>,
    interval: Duration,
) -> Result<ReaperHandle> {
    let period = interval.max(MIN_INTERVAL);
    let runtime = Builder::new_current_thread().enable_time().build()?;
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let cache_name = name.to_string();

    // Thread names may not contain NUL
    let thread_name = format!("kvcache-reaper-{}", name.replace('\0', ""));
    let thread = std::thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            runtime.block_on(async move {
                info!(
                    "Starting reaper for cache {} with interval of {:?}",
                    cache_name, period
                );

                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        _ = &mut shutdown_rx => break,
                        _ = ticker.tick() => {}
                    }

                    match sweep(&store, &stats) {
                        Ok(removed) if removed > 0 => {
                            info!("Reaper {}: removed {} expired entries", cache_name, removed)
                        }
                        Ok(_) => debug!("Reaper {}: no expired entries found", cache_name),
                        Err(err) => error!("Reaper {}: sweep failed: {}", cache_name, err),
                    }
                }

                if let Err(err) = store.close() {
                    warn!("Reaper {}: closing connection failed: {}", cache_name, err);
                }
                debug!("Reaper for cache {} stopped", cache_name);
            });
        })?;

    Ok(ReaperHandle {
        shutdown: Some(shutdown_tx),
        thread: Some(thread),
    })
}
