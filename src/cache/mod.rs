//! Persistent TTL cache with pluggable backends.
//!
//! This module provides a content-agnostic cache that:
//! - Stores JSON envelopes (`data`, `createdAt`, `ttl`) per `(store, key)`
//! - Treats expired entries as absent on ordinary reads
//! - Keeps expired entries around so they can be served when offline
//! - Degrades silently: storage errors become misses or dropped writes

mod kv;
mod memory;
mod storage;
mod store;
mod traits;

pub use kv::FileKvStorage;
pub use memory::MemoryStorage;
pub use storage::SqliteStorage;
pub use store::{origin_scope, PersistentStore};
pub use traits::{
  CacheEntry, CacheResult, CacheSource, StorageBackend, StorageError, Store, StoredEntry,
};
