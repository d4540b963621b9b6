//! Process-local cache backend for non-interactive contexts and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::{StorageBackend, StorageError, Store, StoredEntry};

/// Storage implementation that keeps everything in memory.
/// Nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<(Store, String), StoredEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl StorageBackend for MemoryStorage {
  fn name(&self) -> &'static str {
    "memory"
  }

  fn read(&self, store: Store, key: &str) -> Result<Option<StoredEntry>, StorageError> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| StorageError::Unavailable(format!("lock poisoned: {}", e)))?;
    Ok(entries.get(&(store, key.to_string())).cloned())
  }

  fn write(&self, store: Store, key: &str, entry: &StoredEntry) -> Result<(), StorageError> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| StorageError::Unavailable(format!("lock poisoned: {}", e)))?;
    entries.insert((store, key.to_string()), entry.clone());
    Ok(())
  }

  fn clear(&self, store: Option<Store>) -> Result<(), StorageError> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| StorageError::Unavailable(format!("lock poisoned: {}", e)))?;
    match store {
      Some(store) => entries.retain(|(s, _), _| *s != store),
      None => entries.clear(),
    }
    Ok(())
  }
}
