//! Core traits and types for the caching system.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Logical partition of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Store {
  Collections,
  Books,
  Hadiths,
  Daily,
}

impl Store {
  pub const ALL: [Store; 4] = [Store::Collections, Store::Books, Store::Hadiths, Store::Daily];

  pub fn as_str(&self) -> &'static str {
    match self {
      Store::Collections => "collections",
      Store::Books => "books",
      Store::Hadiths => "hadiths",
      Store::Daily => "daily",
    }
  }
}

impl fmt::Display for Store {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Store {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Store::ALL
      .into_iter()
      .find(|store| store.as_str() == s)
      .ok_or_else(|| format!("unknown cache store '{}'", s))
  }
}

/// A cached value together with when it was written and how long it lives.
///
/// Serialized as `{"data": .., "createdAt": <ms>, "ttl": <ms>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub data: T,
  #[serde(rename = "createdAt", with = "chrono::serde::ts_milliseconds")]
  pub created_at: DateTime<Utc>,
  #[serde(with = "ttl_millis")]
  pub ttl: Duration,
}

impl<T> CacheEntry<T> {
  pub fn new(data: T, created_at: DateTime<Utc>, ttl: Duration) -> Self {
    Self {
      data,
      created_at,
      ttl,
    }
  }

  /// An entry is valid while `now - created_at < ttl`.
  pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
    now - self.created_at < self.ttl
  }
}

/// Backend-level entry: the payload is kept as untyped JSON.
pub type StoredEntry = CacheEntry<serde_json::Value>;

mod ttl_millis {
  use chrono::Duration;
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(ttl.num_milliseconds())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    i64::deserialize(deserializer).map(Duration::milliseconds)
  }
}

/// Failures inside a storage backend. These never escape `PersistentStore`.
#[derive(Debug, Error)]
pub enum StorageError {
  #[error("storage quota exceeded")]
  QuotaExceeded,
  #[error("storage backend unavailable: {0}")]
  Unavailable(String),
  #[error("failed to (de)serialize cache entry: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Trait for cache storage backends.
///
/// Backends are untyped; `PersistentStore` handles (de)serialization of the
/// payload and TTL checks.
pub trait StorageBackend: Send + Sync {
  /// Short name used in logs.
  fn name(&self) -> &'static str;

  /// Read the raw entry for `(store, key)`, regardless of expiry.
  fn read(&self, store: Store, key: &str) -> Result<Option<StoredEntry>, StorageError>;

  /// Write (overwrite) the entry for `(store, key)`.
  fn write(&self, store: Store, key: &str, entry: &StoredEntry) -> Result<(), StorageError>;

  /// Remove every entry of `store`, or of all stores when `None`.
  fn clear(&self, store: Option<Store>) -> Result<(), StorageError>;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from a valid cache entry.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode (network failed, cache served).
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  /// Create a result built from embedded or synthesized fallback data.
  pub fn fallback(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Fallback,
      cached_at: None,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Valid cache entry served without a network attempt
  CacheFresh,
  /// Network failed, serving a cached entry (possibly expired)
  Offline,
  /// Network failed and nothing was cached: static or synthesized data
  Fallback,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_entry_validity_boundary() {
    let created = Utc::now();
    let entry = CacheEntry::new(1u32, created, Duration::seconds(10));
    assert!(entry.is_valid(created));
    assert!(entry.is_valid(created + Duration::milliseconds(9_999)));
    assert!(!entry.is_valid(created + Duration::seconds(10)));
    assert!(!entry.is_valid(created + Duration::seconds(11)));
  }

  #[test]
  fn test_envelope_field_names() {
    let created = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
    let entry = CacheEntry::new("x", created, Duration::hours(1));
    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["data"], "x");
    assert_eq!(json["createdAt"], 1_700_000_000_000i64);
    assert_eq!(json["ttl"], 3_600_000);
  }

  #[test]
  fn test_store_parse() {
    assert_eq!("hadiths".parse::<Store>(), Ok(Store::Hadiths));
    assert!("nope".parse::<Store>().is_err());
  }
}
