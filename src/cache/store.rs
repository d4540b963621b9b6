//! Typed facade over whichever storage backend was selected at startup.

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::kv::FileKvStorage;
use super::memory::MemoryStorage;
use super::storage::SqliteStorage;
use super::traits::{CacheEntry, StorageBackend, Store, StoredEntry};
use crate::clock::Clock;
use crate::config::{BackendKind, CacheConfig};

/// Key/value store with per-entry expiration.
///
/// Never fails: backend errors are logged and read as a miss, writes that
/// cannot be persisted are dropped.
pub struct PersistentStore {
  backend: Box<dyn StorageBackend>,
  clock: Arc<dyn Clock>,
}

impl PersistentStore {
  pub fn new(backend: Box<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
    Self { backend, clock }
  }

  pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
    Self::new(Box::new(MemoryStorage::new()), clock)
  }

  /// Select and open a backend once.
  ///
  /// Non-interactive contexts always get the in-memory backend. Otherwise
  /// `auto` prefers SQLite and falls back to the key/value file, then memory.
  pub fn open(config: &CacheConfig, origin: &str, interactive: bool, clock: Arc<dyn Clock>) -> Self {
    if !interactive || config.backend == BackendKind::Memory {
      info!("Using in-memory cache backend");
      return Self::in_memory(clock);
    }

    let Some(dir) = config.data_dir().map(|d| d.join(origin_scope(origin))) else {
      warn!("Could not determine data directory, using in-memory cache");
      return Self::in_memory(clock);
    };

    let backend = match config.backend {
      BackendKind::Sqlite => open_sqlite(&dir),
      BackendKind::File => open_kv(&dir, config),
      _ => open_sqlite(&dir).or_else(|| open_kv(&dir, config)),
    };

    match backend {
      Some(backend) => {
        info!(backend = backend.name(), dir = %dir.display(), "Opened cache backend");
        Self::new(backend, clock)
      }
      None => {
        warn!("No persistent cache backend available, using in-memory cache");
        Self::in_memory(clock)
      }
    }
  }

  pub fn backend_name(&self) -> &'static str {
    self.backend.name()
  }

  /// Get a value if it is present and not expired.
  pub fn get<T: DeserializeOwned>(&self, store: Store, key: &str) -> Option<T> {
    let now = self.clock.now();
    self
      .get_entry(store, key)
      .filter(|entry| entry.is_valid(now))
      .map(|entry| entry.data)
  }

  /// Get the entry for `(store, key)` whether or not it has expired.
  pub fn get_entry<T: DeserializeOwned>(&self, store: Store, key: &str) -> Option<CacheEntry<T>> {
    let raw = match self.backend.read(store, key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(%store, key, error = %e, "Cache read failed");
        return None;
      }
    };

    match serde_json::from_value::<T>(raw.data) {
      Ok(data) => Some(CacheEntry::new(data, raw.created_at, raw.ttl)),
      Err(e) => {
        debug!(%store, key, error = %e, "Ignoring cache entry with unexpected shape");
        None
      }
    }
  }

  /// Write `data` with `created_at = now`, overwriting any previous entry.
  pub fn set<T: Serialize>(&self, store: Store, key: &str, data: &T, ttl: Duration) {
    let value = match serde_json::to_value(data) {
      Ok(value) => value,
      Err(e) => {
        warn!(%store, key, error = %e, "Failed to serialize cache entry");
        return;
      }
    };

    let entry = StoredEntry::new(value, self.clock.now(), ttl);
    if let Err(e) = self.backend.write(store, key, &entry) {
      warn!(%store, key, error = %e, "Dropping cache write");
    }
  }

  /// Remove every entry of `store`, or everything when `None`.
  pub fn clear(&self, store: Option<Store>) {
    if let Err(e) = self.backend.clear(store) {
      warn!(store = ?store, error = %e, "Failed to clear cache");
    }
  }
}

fn open_sqlite(dir: &Path) -> Option<Box<dyn StorageBackend>> {
  match SqliteStorage::open(&dir.join("cache.db")) {
    Ok(storage) => Some(Box::new(storage)),
    Err(e) => {
      warn!(error = %e, "SQLite cache unavailable");
      None
    }
  }
}

fn open_kv(dir: &Path, config: &CacheConfig) -> Option<Box<dyn StorageBackend>> {
  let path: PathBuf = dir.join("kv.json");
  match FileKvStorage::open(&path, &config.namespace, config.max_entries, config.quota_bytes) {
    Ok(storage) => Some(Box::new(storage)),
    Err(e) => {
      warn!(error = %e, "Key/value cache unavailable");
      None
    }
  }
}

/// Directory name that scopes persisted state to one API origin.
pub fn origin_scope(origin: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(origin.trim_end_matches('/').as_bytes());
  let digest = hex::encode(hasher.finalize());
  digest[..16].to_string()
}
