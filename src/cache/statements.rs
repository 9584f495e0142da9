//! Statement Set Module
//!
//! The fixed set of SQL operations the cache runs. Each goes through
//! rusqlite's per-connection statement cache, so the SQL is parsed once and
//! reused on every later call.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CacheError, Result};

const GET_SQL: &str = "SELECT value, expires_at FROM kv WHERE key = ?1";

const UPSERT_NO_EXPIRY_SQL: &str = "INSERT INTO kv(key, value, expires_at) VALUES (?1, ?2, NULL)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = NULL";

const UPSERT_WITH_EXPIRY_SQL: &str = "INSERT INTO kv(key, value, expires_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at";

const DELETE_SQL: &str = "DELETE FROM kv WHERE key = ?1";

const PURGE_EXPIRED_SQL: &str = "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1";

// == Lookup ==
/// Outcome of reading a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Row exists and has not expired
    Live(String),
    /// Row exists but `expires_at <= now`
    Expired,
    /// No row for the key
    Missing,
}

// == Get Live ==
/// Reads `key` and classifies it against `now_ms`.
///
/// An entry is expired once `now_ms >= expires_at`.
pub fn get_live(conn: &Connection, key: &str, now_ms: i64) -> Result<Lookup> {
    let row = conn
        .prepare_cached(GET_SQL)?
        .query_row(params![key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?))
        })
        .optional()?;

    Ok(match row {
        None => Lookup::Missing,
        Some((_, Some(expires_at))) if now_ms >= expires_at => Lookup::Expired,
        Some((value, _)) => Lookup::Live(value),
    })
}

// == Upserts ==
/// Inserts or overwrites `key`, clearing any expiry.
pub fn upsert_no_expiry(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.prepare_cached(UPSERT_NO_EXPIRY_SQL)?
        .execute(params![key, value])?;
    Ok(())
}

/// Inserts or overwrites `key` with an absolute expiry in Unix milliseconds.
pub fn upsert_with_expiry(
    conn: &Connection,
    key: &str,
    value: &str,
    expires_at_ms: i64,
) -> Result<()> {
    conn.prepare_cached(UPSERT_WITH_EXPIRY_SQL)?
        .execute(params![key, value, expires_at_ms])?;
    Ok(())
}

// == Delete ==
/// Removes `key`. Returns the number of rows deleted (0 or 1).
pub fn delete(conn: &Connection, key: &str) -> Result<usize> {
    Ok(conn.prepare_cached(DELETE_SQL)?.execute(params![key])?)
}

// == Purge Expired ==
/// Deletes every row whose expiry is at or before `now_ms`.
///
/// Returns the number of rows removed.
pub fn purge_expired(conn: &Connection, now_ms: i64) -> Result<usize> {
    conn.prepare_cached(PURGE_EXPIRED_SQL)
        .and_then(|mut stmt| stmt.execute(params![now_ms]))
        .map_err(CacheError::Purge)
}
