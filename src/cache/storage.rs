//! SQLite cache backend.

use chrono::{DateTime, Duration};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::{StorageBackend, StorageError, Store, StoredEntry};

/// SQLite-based cache storage, one row per `(store, key)`.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    store TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    ttl_ms INTEGER NOT NULL,
    PRIMARY KEY (store, entry_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_created
    ON cache_entries(store, created_at);
"#;

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self, StorageError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StorageError::Unavailable(format!("failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StorageError::Unavailable(format!(
        "failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// In-memory database, mostly useful for tests.
  pub fn open_in_memory() -> Result<Self, StorageError> {
    let conn = Connection::open_in_memory().map_err(map_sqlite_error)?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self, StorageError> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| StorageError::Unavailable(format!("failed to run cache migrations: {}", e)))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
    self
      .conn
      .lock()
      .map_err(|e| StorageError::Unavailable(format!("lock poisoned: {}", e)))
  }
}

impl StorageBackend for SqliteStorage {
  fn name(&self) -> &'static str {
    "sqlite"
  }

  fn read(&self, store: Store, key: &str) -> Result<Option<StoredEntry>, StorageError> {
    let conn = self.lock()?;

    let row: Option<(String, i64, i64)> = conn
      .query_row(
        "SELECT data, created_at, ttl_ms FROM cache_entries
         WHERE store = ? AND entry_key = ?",
        params![store.as_str(), key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(map_sqlite_error)?;

    let Some((data, created_at, ttl_ms)) = row else {
      return Ok(None);
    };

    let created_at = DateTime::from_timestamp_millis(created_at).ok_or_else(|| {
      StorageError::Unavailable(format!("invalid created_at {} for {}/{}", created_at, store, key))
    })?;

    Ok(Some(StoredEntry {
      data: serde_json::from_str(&data)?,
      created_at,
      ttl: Duration::milliseconds(ttl_ms),
    }))
  }

  fn write(&self, store: Store, key: &str, entry: &StoredEntry) -> Result<(), StorageError> {
    let conn = self.lock()?;
    let data = serde_json::to_string(&entry.data)?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries (store, entry_key, data, created_at, ttl_ms)
         VALUES (?, ?, ?, ?, ?)",
        params![
          store.as_str(),
          key,
          data,
          entry.created_at.timestamp_millis(),
          entry.ttl.num_milliseconds()
        ],
      )
      .map_err(map_sqlite_error)?;

    Ok(())
  }

  fn clear(&self, store: Option<Store>) -> Result<(), StorageError> {
    let conn = self.lock()?;

    match store {
      Some(store) => conn.execute(
        "DELETE FROM cache_entries WHERE store = ?",
        params![store.as_str()],
      ),
      None => conn.execute("DELETE FROM cache_entries", []),
    }
    .map_err(map_sqlite_error)?;

    Ok(())
  }
}

fn map_sqlite_error(err: rusqlite::Error) -> StorageError {
  match err.sqlite_error_code() {
    Some(ErrorCode::DiskFull) => StorageError::QuotaExceeded,
    _ => StorageError::Unavailable(err.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use serde_json::json;
  use tempfile::TempDir;

  fn entry(data: serde_json::Value) -> StoredEntry {
    StoredEntry::new(data, Utc::now(), Duration::hours(1))
  }

  #[test]
  fn test_write_and_read() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .write(Store::Books, "bukhari", &entry(json!([{"number": 1}])))
      .unwrap();

    let read = storage.read(Store::Books, "bukhari").unwrap().unwrap();
    assert_eq!(read.data, json!([{"number": 1}]));
    assert_eq!(read.ttl, Duration::hours(1));
  }

  #[test]
  fn test_partitions_are_separate() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.write(Store::Books, "k", &entry(json!(1))).unwrap();

    assert!(storage.read(Store::Collections, "k").unwrap().is_none());
    assert!(storage.read(Store::Books, "k").unwrap().is_some());
  }

  #[test]
  fn test_clear_one_store() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.write(Store::Books, "a", &entry(json!(1))).unwrap();
    storage.write(Store::Daily, "b", &entry(json!(2))).unwrap();

    storage.clear(Some(Store::Books)).unwrap();
    assert!(storage.read(Store::Books, "a").unwrap().is_none());
    assert!(storage.read(Store::Daily, "b").unwrap().is_some());

    storage.clear(None).unwrap();
    assert!(storage.read(Store::Daily, "b").unwrap().is_none());
  }

  #[test]
  fn test_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    {
      let storage = SqliteStorage::open(&path).unwrap();
      storage.write(Store::Daily, "2024-01-01", &entry(json!("x"))).unwrap();
    }
    let storage = SqliteStorage::open(&path).unwrap();
    let read = storage.read(Store::Daily, "2024-01-01").unwrap().unwrap();
    assert_eq!(read.data, json!("x"));
  }
}
