//! Flat key/value cache backend persisted as a single JSON file.
//!
//! Used when the SQLite backend cannot be opened. Every item is stored under
//! `<namespace>-<store>-<key>` holding the JSON envelope of a [`StoredEntry`],
//! and the whole file is bounded by a byte quota.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::traits::{StorageBackend, StorageError, Store, StoredEntry};

/// Fraction of namespaced entries dropped by one eviction pass.
const EVICT_FRACTION: usize = 4;

pub struct FileKvStorage {
  namespace: String,
  max_entries: usize,
  quota_bytes: usize,
  /// `<namespace>-<store>-` for every store
  prefixes: Vec<String>,
  state: Mutex<KvState>,
}

struct KvState {
  path: PathBuf,
  items: BTreeMap<String, String>,
}

/// Just enough of the envelope to order entries by age.
#[derive(Deserialize)]
struct EnvelopeAge {
  #[serde(rename = "createdAt")]
  created_at: i64,
}

impl KvState {
  fn usage(&self) -> usize {
    self.items.iter().map(|(k, v)| k.len() + v.len()).sum()
  }

  fn flush(&self) -> Result<(), StorageError> {
    let contents = serde_json::to_vec(&self.items)?;
    let tmp = self.path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)
      .and_then(|_| std::fs::rename(&tmp, &self.path))
      .map_err(|e| {
        StorageError::Unavailable(format!("failed to write {}: {}", self.path.display(), e))
      })
  }
}

impl FileKvStorage {
  /// Open the key/value file at `path`, creating it lazily on first write.
  pub fn open(
    path: &Path,
    namespace: &str,
    max_entries: usize,
    quota_bytes: usize,
  ) -> Result<Self, StorageError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StorageError::Unavailable(format!("failed to create cache directory: {}", e))
      })?;
    }

    let items = match std::fs::read(path) {
      Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Discarding unreadable key/value cache file");
        BTreeMap::new()
      }),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
      Err(e) => {
        return Err(StorageError::Unavailable(format!(
          "failed to read {}: {}",
          path.display(),
          e
        )))
      }
    };

    Ok(Self {
      namespace: namespace.to_string(),
      max_entries,
      quota_bytes,
      prefixes: Store::ALL
        .iter()
        .map(|store| store_prefix(namespace, *store))
        .collect(),
      state: Mutex::new(KvState {
        path: path.to_path_buf(),
        items,
      }),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, KvState>, StorageError> {
    self
      .state
      .lock()
      .map_err(|e| StorageError::Unavailable(format!("lock poisoned: {}", e)))
  }

  fn item_key(&self, store: Store, key: &str) -> String {
    format!("{}{}", store_prefix(&self.namespace, store), key)
  }

  /// Whether `key` is one of our store keys, not another namespace's.
  fn owns(&self, key: &str) -> bool {
    self.prefixes.iter().any(|prefix| key.starts_with(prefix.as_str()))
  }

  fn owned_count(&self, state: &KvState) -> usize {
    state.items.keys().filter(|k| self.owns(k)).count()
  }

  /// Number of items under this backend's namespace.
  pub fn len(&self) -> usize {
    self.lock().map(|state| self.owned_count(&state)).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop the oldest quarter (at least one) of the namespaced items.
  fn evict_oldest(&self, state: &mut KvState) -> Result<(), StorageError> {
    let mut aged: Vec<(i64, String)> = state
      .items
      .iter()
      .filter(|(k, _)| self.owns(k))
      .map(|(k, v)| {
        let created_at = serde_json::from_str::<EnvelopeAge>(v)
          .map(|e| e.created_at)
          .unwrap_or(i64::MIN);
        (created_at, k.clone())
      })
      .collect();

    if aged.is_empty() {
      return Ok(());
    }

    aged.sort();
    let count = (aged.len() / EVICT_FRACTION).max(1);
    for (_, key) in aged.into_iter().take(count) {
      state.items.remove(&key);
    }
    debug!(evicted = count, "Evicted oldest key/value cache entries");

    state.flush()
  }

  /// Insert if the quota allows it, leaving state untouched otherwise.
  fn try_put(&self, state: &mut KvState, key: &str, value: &str) -> Result<(), StorageError> {
    let old = state.items.get(key).cloned();
    let old_len = old.as_ref().map(|v| key.len() + v.len()).unwrap_or(0);
    let new_usage = state.usage() - old_len + key.len() + value.len();
    if new_usage > self.quota_bytes {
      return Err(StorageError::QuotaExceeded);
    }

    state.items.insert(key.to_string(), value.to_string());
    if let Err(e) = state.flush() {
      match old {
        Some(previous) => state.items.insert(key.to_string(), previous),
        None => state.items.remove(key),
      };
      return Err(e);
    }
    Ok(())
  }
}

fn store_prefix(namespace: &str, store: Store) -> String {
  format!("{}-{}-", namespace, store)
}

impl StorageBackend for FileKvStorage {
  fn name(&self) -> &'static str {
    "file"
  }

  fn read(&self, store: Store, key: &str) -> Result<Option<StoredEntry>, StorageError> {
    let state = self.lock()?;
    match state.items.get(&self.item_key(store, key)) {
      Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
      None => Ok(None),
    }
  }

  fn write(&self, store: Store, key: &str, entry: &StoredEntry) -> Result<(), StorageError> {
    let item_key = self.item_key(store, key);
    let value = serde_json::to_string(entry)?;
    let mut state = self.lock()?;

    // Evict once the namespace already holds more than `max_entries`
    if self.owned_count(&state) > self.max_entries {
      self.evict_oldest(&mut state)?;
    }

    match self.try_put(&mut state, &item_key, &value) {
      Err(StorageError::QuotaExceeded) => {
        debug!(key = %item_key, "Key/value quota exceeded, evicting and retrying once");
        self.evict_oldest(&mut state)?;
        self.try_put(&mut state, &item_key, &value)
      }
      other => other,
    }
  }

  fn clear(&self, store: Option<Store>) -> Result<(), StorageError> {
    let prefix = store.map(|store| store_prefix(&self.namespace, store));
    let mut state = self.lock()?;
    state.items.retain(|k, _| match &prefix {
      Some(prefix) => !k.starts_with(prefix.as_str()),
      None => !self.owns(k),
    });
    state.flush()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{DateTime, Duration};
  use serde_json::json;
  use tempfile::TempDir;

  fn entry_at(seconds: i64) -> StoredEntry {
    let created = DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap();
    StoredEntry::new(json!({ "n": seconds }), created, Duration::days(7))
  }

  fn open(dir: &TempDir, max_entries: usize, quota_bytes: usize) -> FileKvStorage {
    FileKvStorage::open(&dir.path().join("kv.json"), "hc", max_entries, quota_bytes).unwrap()
  }

  #[test]
  fn test_key_layout_and_envelope() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir, 100, 1 << 20);
    storage.write(Store::Books, "bukhari", &entry_at(0)).unwrap();

    let raw: BTreeMap<String, String> =
      serde_json::from_slice(&std::fs::read(dir.path().join("kv.json")).unwrap()).unwrap();
    let envelope: serde_json::Value = serde_json::from_str(&raw["hc-books-bukhari"]).unwrap();
    assert_eq!(envelope["data"], json!({ "n": 0 }));
    assert!(envelope["createdAt"].is_i64());
    assert!(envelope["ttl"].is_i64());
  }

  #[test]
  fn test_reopen_reads_persisted_items() {
    let dir = TempDir::new().unwrap();
    open(&dir, 100, 1 << 20)
      .write(Store::Daily, "2024-03-01", &entry_at(5))
      .unwrap();

    let storage = open(&dir, 100, 1 << 20);
    let read = storage.read(Store::Daily, "2024-03-01").unwrap().unwrap();
    assert_eq!(read.data, json!({ "n": 5 }));
  }

  #[test]
  fn test_evicts_oldest_quarter_past_threshold() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir, 100, 1 << 20);

    for i in 0..101 {
      storage
        .write(Store::Hadiths, &format!("k{}", i), &entry_at(i))
        .unwrap();
    }
    // Writes made while holding at most the limit do not evict
    assert_eq!(storage.len(), 101);

    storage.write(Store::Hadiths, "new", &entry_at(500)).unwrap();

    assert_eq!(storage.len(), 101 - 25 + 1);
    assert!(storage.read(Store::Hadiths, "k0").unwrap().is_none());
    assert!(storage.read(Store::Hadiths, "k24").unwrap().is_none());
    assert!(storage.read(Store::Hadiths, "k25").unwrap().is_some());
    assert!(storage.read(Store::Hadiths, "new").unwrap().is_some());
  }

  #[test]
  fn test_quota_failure_evicts_and_retries_once() {
    let dir = TempDir::new().unwrap();
    let one = "hc-hadiths-k0".len() + serde_json::to_string(&entry_at(0)).unwrap().len();
    let storage = open(&dir, 100, one * 4);

    for i in 0..4 {
      storage
        .write(Store::Hadiths, &format!("k{}", i), &entry_at(i))
        .unwrap();
    }

    storage.write(Store::Hadiths, "k9", &entry_at(9)).unwrap();
    assert!(storage.read(Store::Hadiths, "k0").unwrap().is_none());
    assert!(storage.read(Store::Hadiths, "k9").unwrap().is_some());
  }

  #[test]
  fn test_oversized_write_is_rejected() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir, 100, 64);
    let big = StoredEntry::new(json!("x".repeat(200)), entry_at(0).created_at, Duration::days(1));

    let result = storage.write(Store::Daily, "big", &big);
    assert!(matches!(result, Err(StorageError::QuotaExceeded)));
    assert!(storage.read(Store::Daily, "big").unwrap().is_none());
  }

  #[test]
  fn test_clear_keeps_foreign_keys() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir, 100, 1 << 20);
    storage.write(Store::Books, "a", &entry_at(1)).unwrap();
    storage.write(Store::Daily, "b", &entry_at(2)).unwrap();
    storage.lock().unwrap().items.insert("other-app".into(), "1".into());

    storage.clear(Some(Store::Books)).unwrap();
    assert!(storage.read(Store::Books, "a").unwrap().is_none());
    assert!(storage.read(Store::Daily, "b").unwrap().is_some());

    storage.clear(None).unwrap();
    assert!(storage.is_empty());
    assert!(storage.lock().unwrap().items.contains_key("other-app"));
  }

  #[test]
  fn test_sibling_namespace_is_not_ours() {
    let dir = TempDir::new().unwrap();
    let storage = open(&dir, 2, 1 << 20);
    {
      let mut state = storage.lock().unwrap();
      for i in 0..5 {
        let raw = serde_json::to_string(&entry_at(-100 + i)).unwrap();
        state.items.insert(format!("hc-legacy-books-{}", i), raw);
      }
    }
    assert!(storage.is_empty());

    for i in 0..4 {
      storage.write(Store::Books, &format!("b{}", i), &entry_at(i)).unwrap();
    }
    assert_eq!(storage.len(), 3);
    assert!(storage.read(Store::Books, "b0").unwrap().is_none());

    storage.clear(None).unwrap();
    assert!(storage.is_empty());
    assert_eq!(storage.lock().unwrap().items.len(), 5);
  }
}
