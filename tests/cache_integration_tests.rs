//! Integration Tests for the Cache
//!
//! Exercises the public API end to end against in-memory and file-backed
//! stores, with the background reaper running.

use std::sync::{Arc, Once};
use std::time::Duration;

use kvcache::{Cache, CacheConfig, CacheError, ReaperState};
use tempfile::TempDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// == Helper Functions ==

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "kvcache=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

fn file_cache(dir: &TempDir, name: &str, interval: Duration) -> Cache {
    init_tracing();
    let config = CacheConfig::default()
        .with_data_dir(dir.path())
        .with_cleanup_interval(interval);
    Cache::with_config(name, config).unwrap()
}

fn assert_miss(result: kvcache::Result<String>) {
    match result {
        Err(err) => assert!(err.is_miss(), "Expected a miss, got {err}"),
        Ok(value) => panic!("Expected a miss, got value {value:?}"),
    }
}

// == Scenarios ==

#[tokio::test]
async fn test_end_to_end_scenario() {
    init_tracing();
    let cache = Cache::in_memory(Duration::from_secs(3600)).unwrap();

    cache.set("a", "1").unwrap();
    assert_eq!(cache.get("a").unwrap(), "1");

    cache
        .set_with_expiry("b", "2", Duration::from_millis(100))
        .unwrap();
    assert_eq!(cache.get("b").unwrap(), "2");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_miss(cache.get("b"));

    cache.delete("a").unwrap();
    assert!(matches!(cache.get("a"), Err(CacheError::NotFound(_))));

    cache.close().unwrap();
}

#[tokio::test]
async fn test_overwrite_clears_ttl() {
    init_tracing();
    let cache = Cache::in_memory(Duration::from_millis(100)).unwrap();

    cache
        .set_with_expiry("k", "v1", Duration::from_secs(1))
        .unwrap();
    cache.set("k", "v2").unwrap();

    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert_eq!(cache.get("k").unwrap(), "v2");
    cache.close().unwrap();
}

#[test]
fn test_sweep_reduces_storage_without_reads() {
    let dir = tempfile::tempdir().unwrap();
    let cache = file_cache(&dir, "sweep", Duration::from_millis(200));

    for i in 0..25 {
        cache
            .set_with_expiry(&format!("token:{i}"), "x", Duration::from_secs(1))
            .unwrap();
    }
    cache.set("permanent", "kept").unwrap();
    assert_eq!(cache.stored_rows().unwrap(), 26);

    std::thread::sleep(Duration::from_millis(1600));

    assert_eq!(cache.stored_rows().unwrap(), 1);
    assert_eq!(cache.get("permanent").unwrap(), "kept");

    let stats = cache.stats();
    assert_eq!(stats.purged, 25);
    assert_eq!(stats.failed_sweeps, 0);
    assert_eq!(stats.hits, 1);

    cache.close().unwrap();
}

#[test]
fn test_values_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let cache = file_cache(&dir, "persist", Duration::from_secs(3600));
    cache.set("session", "abc").unwrap();
    cache
        .set_with_expiry("otp", "123456", Duration::from_secs(600))
        .unwrap();
    cache.close().unwrap();

    assert!(dir.path().join("persist.db").is_file());

    let reopened = file_cache(&dir, "persist", Duration::from_secs(3600));
    assert_eq!(reopened.get("session").unwrap(), "abc");
    assert_eq!(reopened.get("otp").unwrap(), "123456");
    reopened.close().unwrap();
}

#[test]
fn test_separate_names_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let first = file_cache(&dir, "first", Duration::from_secs(3600));
    let second = file_cache(&dir, "second", Duration::from_secs(3600));

    first.set("k", "from-first").unwrap();

    assert!(matches!(second.get("k"), Err(CacheError::NotFound(_))));
    first.close().unwrap();
    second.close().unwrap();
}

#[test]
fn test_open_fails_when_data_dir_is_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("occupied");
    std::fs::write(&file, b"not a directory").unwrap();

    let config = CacheConfig::default().with_data_dir(&file);
    let err = Cache::with_config("kv", config).unwrap_err();

    assert!(err.is_io(), "Expected an I/O error, got {err}");
}

#[test]
fn test_concurrent_callers() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(file_cache(&dir, "concurrent", Duration::from_millis(20)));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("w{worker}:{i}");
                    cache.set(&key, &i.to_string()).unwrap();
                    cache.set("shared", &format!("{worker}-{i}")).unwrap();
                    assert_eq!(cache.get(&key).unwrap(), i.to_string());
                    cache
                        .set_with_expiry(&format!("tmp:{worker}:{i}"), "t", Duration::ZERO)
                        .unwrap();
                    cache.delete(&key).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Worker should not panic");
    }

    let shared = cache.get("shared").unwrap();
    let (worker, i) = shared.split_once('-').expect("Value should not be torn");
    assert!(worker.parse::<u32>().unwrap() < 8);
    assert!(i.parse::<u32>().unwrap() < 50);

    let cache = Arc::try_unwrap(cache).expect("Workers should have released the cache");
    cache.purge_expired().unwrap();
    assert_eq!(cache.stored_rows().unwrap(), 1);
    cache.close().unwrap();
}

#[test]
fn test_drop_without_close_stops_reaper() {
    let dir = tempfile::tempdir().unwrap();
    let cache = file_cache(&dir, "dropped", Duration::from_millis(10));
    assert_eq!(cache.reaper_state(), ReaperState::Running);
    drop(cache);

    // The file is released once the reaper thread has exited
    let reopened = file_cache(&dir, "dropped", Duration::from_secs(3600));
    reopened.set("k", "v").unwrap();
    reopened.close().unwrap();
}
