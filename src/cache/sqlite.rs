//! Persistent result cache in a SQLite file.
//!
//! - One row per key, result stored as JSON
//! - No TTL; entries stay valid until the table version changes
//! - Versioned file format, auto-cleared on mismatch

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{CacheError, CacheKey, CacheResult, QueryCache};
use crate::executor::QueryResult;

/// Bump when the stored result format changes.
const CACHE_VERSION: i32 = 1;

/// Result cache backed by a single SQLite connection.
///
/// All access goes through one mutex, so concurrent callers are serialized.
#[derive(Debug)]
pub struct SqliteQueryCache {
    conn: Mutex<Connection>,
}

impl SqliteQueryCache {
    /// Open or create the cache at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let cache = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        cache.init()?;
        info!(path = %path.display(), "opened result cache");
        Ok(cache)
    }

    pub fn open_in_memory() -> CacheResult<Self> {
        let cache = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        cache.init()?;
        Ok(cache)
    }

    /// `<cache dir>/aggplan/results.db`.
    pub fn default_path() -> CacheResult<PathBuf> {
        let base = dirs::cache_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(base.join("aggplan").join("results.db"))
    }

    fn connection(&self) -> CacheResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    fn init(&self) -> CacheResult<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS results (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == CACHE_VERSION => {}
            Some(v) => {
                debug!(stored = v, current = CACHE_VERSION, "cache format changed, clearing");
                conn.execute("DELETE FROM results", [])?;
                set_version(&conn)?;
            }
            None => set_version(&conn)?,
        }
        Ok(())
    }

    pub fn clear(&self) -> CacheResult<()> {
        self.connection()?.execute("DELETE FROM results", [])?;
        Ok(())
    }

    pub fn len(&self) -> CacheResult<usize> {
        let count: i64 = self
            .connection()?
            .query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn set_version(conn: &Connection) -> CacheResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
        params![CACHE_VERSION.to_string()],
    )?;
    Ok(())
}

impl QueryCache for SqliteQueryCache {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<QueryResult>> {
        let json: Option<String> = self
            .connection()?
            .query_row(
                "SELECT value FROM results WHERE key = ?",
                params![key.storage_key()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: CacheKey, result: QueryResult) -> CacheResult<()> {
        let json = serde_json::to_string(&result)?;
        self.connection()?.execute(
            "INSERT OR REPLACE INTO results (key, value) VALUES (?, ?)",
            params![key.storage_key(), json],
        )?;
        Ok(())
    }
}
