//! Durable Store Module
//!
//! Owns a SQLite connection backing a cache: locating the database, tuning
//! the engine for a single-process workload and creating the schema.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Idempotent schema for the single `kv` table.
///
/// `expires_at` holds Unix milliseconds; NULL means the entry never expires.
const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER
);
CREATE INDEX IF NOT EXISTS kv_expires_at ON kv(expires_at) WHERE expires_at IS NOT NULL;";

/// Distinguishes in-memory databases opened by this process
static MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(0);

// == Location ==
/// Where a store's database lives.
#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    /// `memdb` URI; every connection opening it shares one database, which
    /// lives until the last of them closes
    Memory(String),
}

impl Location {
    fn fresh_memory() -> Self {
        let seq = MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed);
        Location::Memory(format!(
            "file:/kvcache-{}-{}?vfs=memdb",
            std::process::id(),
            seq
        ))
    }

    fn label(&self) -> String {
        match self {
            Location::File(path) => path.display().to_string(),
            Location::Memory(uri) => uri.clone(),
        }
    }
}

// == Store ==
/// One connection to the database holding the `kv` table.
///
/// The cache API and the reaper each own a `Store` on the same database, so
/// a sweep never holds the connection callers read through. `Connection` is
/// `Send` but not `Sync`; the mutex only makes the handle shareable between
/// caller threads.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
    location: Location,
    label: String,
    busy_timeout: Duration,
    cache_size: i64,
    primary: bool,
}

impl Store {
    // == Open ==
    /// Opens (or creates) `<data_dir>/<name>.db`, or an in-memory database
    /// when `config.in_memory` is set.
    pub fn open(name: &str, config: &CacheConfig) -> Result<Self> {
        if config.in_memory {
            return Self::open_in_memory(config);
        }

        ensure_dir(&config.data_dir)?;
        let location = Location::File(config.data_dir.join(format!("{name}.db")));
        let store = Self::connect(location, config, true)?;

        info!("Opened cache store at {}", store.label);
        Ok(store)
    }

    /// Opens an ephemeral database that disappears once every connection to
    /// it has closed.
    pub fn open_in_memory(config: &CacheConfig) -> Result<Self> {
        let store = Self::connect(Location::fresh_memory(), config, true)?;

        debug!("Opened in-memory cache store {}", store.label);
        Ok(store)
    }

    /// Opens a second connection to the same database.
    ///
    /// The new store skips the checkpoint on close; that is left to the
    /// store it was opened from.
    pub fn reopen(&self) -> Result<Self> {
        let conn = open_connection(&self.location, self.busy_timeout, self.cache_size)?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: self.location.clone(),
            label: self.label.clone(),
            busy_timeout: self.busy_timeout,
            cache_size: self.cache_size,
            primary: false,
        })
    }

    fn connect(location: Location, config: &CacheConfig, primary: bool) -> Result<Self> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let conn = open_connection(&location, busy_timeout, config.cache_size)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            label: location.label(),
            location,
            busy_timeout,
            cache_size: config.cache_size,
            primary,
        })
    }

    // == Connection Access ==
    /// Locks the connection for one operation.
    ///
    /// A panic while holding the lock cannot leave SQLite half-written, so a
    /// poisoned lock is recovered rather than propagated.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the database path, or the in-memory URI.
    pub fn location(&self) -> &str {
        &self.label
    }

    // == Row Count ==
    /// Returns the number of physical rows, including expired rows the
    /// reaper has not removed yet.
    pub fn row_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    // == Close ==
    /// Closes the connection.
    ///
    /// The store a cache was opened with first checkpoints the write-ahead
    /// log; if another connection still pins the log, the connection is
    /// closed anyway and [`CacheError::Checkpoint`] is returned.
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().unwrap_or_else(PoisonError::into_inner);

        let checkpoint_busy = match self.location {
            Location::File(_) if self.primary => {
                let busy: i64 =
                    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| row.get(0))?;
                busy != 0
            }
            _ => false,
        };
        conn.close().map_err(|(_, err)| CacheError::Storage(err))?;

        if checkpoint_busy {
            return Err(CacheError::Checkpoint(self.label));
        }
        debug!("Closed cache store {}", self.label);
        Ok(())
    }
}

// == Utility Functions ==
/// Opens a connection and applies engine pragmas.
///
/// File databases use WAL so readers carry on while the reaper deletes.
/// `memdb` cannot host a WAL, and its rollback journal is kept in memory.
fn open_connection(
    location: &Location,
    busy_timeout: Duration,
    cache_size: i64,
) -> Result<Connection> {
    let (conn, journal) = match location {
        Location::File(path) => (Connection::open(path)?, "WAL"),
        Location::Memory(uri) => (Connection::open(uri)?, "MEMORY"),
    };

    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", journal, |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _: String =
        conn.pragma_update_and_check(None, "locking_mode", "NORMAL", |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "cache_size", cache_size)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    debug!(
        "Connected to cache store {} (journal_mode={})",
        location.label(),
        journal_mode
    );
    Ok(conn)
}

/// Creates `path` if missing; fails if it exists and is not a directory.
fn ensure_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(CacheError::NotADirectory(PathBuf::from(path))),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(path)?;
            debug!("Created cache directory {}", path.display());
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
