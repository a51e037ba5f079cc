//! # Ledger
//!
//! Key-ordered record store holding the last-applied state of a
//! reconciliation run.
//!
//! This crate provides:
//! - The [`RecordStore`] contract: `get`, `put`, `delete` and ordered prefix scans
//! - [`SqliteStore`], a single-table SQLite implementation for real runs
//! - [`MemoryStore`], a `BTreeMap` implementation for tests and dry runs
//!
//! Values are opaque bytes. Callers namespace their keys (`user@alice`,
//! `group@dev`) so that each kind of record can be scanned on its own.
//!
//! ## Example
//!
//! ```no_run
//! use ledger::{RecordStore, SqliteStore};
//! use std::path::Path;
//!
//! let mut store = SqliteStore::open(Path::new("/var/lib/accord/state.db"))?;
//! store.put("group@dev", br#"{"schema":"group/v1","id":"dev"}"#)?;
//!
//! for entry in store.scan_prefix("group@")? {
//!     println!("{} ({} bytes)", entry.key, entry.value.len());
//! }
//! # Ok::<(), ledger::Error>(())
//! ```

mod error;
mod memory;
mod types;

pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use types::{Entry, StoreStats};

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// Contract for the persistent record store
///
/// Scans return entries ordered by key. The result is fully materialized,
/// so callers may `put` or `delete` while walking it.
pub trait RecordStore {
    /// Fetch the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or replace the value stored under `key`
    fn put(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`, returning whether it was present
    fn delete(&mut self, key: &str) -> Result<bool>;

    /// All entries whose key starts with `prefix`, ordered by key
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<Entry>>;

    /// Whether `key` is present
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Record count and most recent write
    fn stats(&self) -> Result<StoreStats> {
        let entries = self.scan_prefix("")?;
        Ok(StoreStats {
            records: entries.len() as u64,
            last_write: entries.iter().map(|e| e.updated_at).max(),
        })
    }
}

/// A record store backed by a SQLite database file
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create a store at the given path
    ///
    /// Creates the database file and the records table if they don't exist.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path).map_err(|source| Error::Open {
            path: db_path.to_path_buf(),
            source,
        })?;

        Self::init(conn)
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;

        Ok(Self { conn })
    }
}

impl RecordStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row("SELECT value FROM records WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO records (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM records WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<Entry>> {
        let mut stmt = self.conn.prepare(
            "SELECT key, value, updated_at
             FROM records
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key",
        )?;

        let rows = stmt.query_map([prefix], |row| {
            Ok(Entry {
                key: row.get(0)?,
                value: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

// ============================================================================
// Tests
// ============================================================================
