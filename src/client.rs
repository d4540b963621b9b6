//! Content client with transparent caching, retries and offline fallbacks.

use chrono::Duration;
use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{
  Book, Collection, ContentApi, FetchError, HttpContentApi, Record, RecordPage, RecordQuery,
};
use crate::cache::{CacheResult, CacheSource, PersistentStore, Store};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::fallback::{placeholder_books, StaticFallbackDataset};
use crate::health::{probe_once, HealthMonitor, HealthProbe, HealthState, DEGRADED_MESSAGE};
use crate::notify::{Notifier, Severity};
use crate::retry::RetryPolicy;

/// Time-to-live per kind of content.
pub mod ttl {
  use chrono::Duration;

  pub fn collections() -> Duration {
    Duration::days(7)
  }

  pub fn books() -> Duration {
    Duration::days(7)
  }

  pub fn records() -> Duration {
    Duration::hours(1)
  }

  pub fn daily() -> Duration {
    Duration::hours(24)
  }
}

/// Cache key of the full collection list.
pub const ALL_COLLECTIONS_KEY: &str = "all";

/// Outcome of [`ResilientClient::warm`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmSummary {
  pub collections: usize,
  pub collections_source: CacheSource,
  /// Book lists that were refreshed from the network
  pub books_refreshed: usize,
}

/// Read-only client for the content service that never fails a read.
///
/// Every read consults the cache, tries the network through the retry
/// policy, writes successful results through to the cache and falls back to
/// cached (even expired) data, then to the embedded dataset, then to an
/// empty or synthesized result.
///
/// Concurrent reads of the same key are not coalesced: each may miss the
/// cache and hit the network, and the last write wins.
pub struct ResilientClient {
  api: Arc<dyn ContentApi>,
  cache: Arc<PersistentStore>,
  health: Arc<HealthMonitor>,
  notifier: Arc<dyn Notifier>,
  clock: Arc<dyn Clock>,
  retry: RetryPolicy,
  fallback: StaticFallbackDataset,
  /// Serve valid cache without a network attempt if the last health check
  /// is this recent
  recent_check: Duration,
  probe_interval: std::time::Duration,
  interactive: bool,
}

impl ResilientClient {
  pub fn new(
    api: Arc<dyn ContentApi>,
    cache: Arc<PersistentStore>,
    health: Arc<HealthMonitor>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      api,
      cache,
      health,
      notifier,
      clock,
      retry: RetryPolicy::default(),
      fallback: StaticFallbackDataset::embedded(),
      recent_check: Duration::seconds(5),
      probe_interval: std::time::Duration::from_secs(30),
      interactive: true,
    }
  }

  /// Wire up the HTTP transport, the configured cache backend and a fresh
  /// health monitor.
  pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let api = HttpContentApi::new(config)?;
    let cache = PersistentStore::open(
      &config.cache,
      &api.origin(),
      config.interactive,
      Arc::clone(&clock),
    );
    let health = HealthMonitor::with_threshold(Arc::clone(&clock), config.health.failure_threshold);

    Ok(
      Self::new(
        Arc::new(api),
        Arc::new(cache),
        Arc::new(health),
        notifier,
        clock,
      )
      .with_retry(RetryPolicy::from(&config.retry))
      .with_recent_check(config.health.recent_check())
      .with_probe(config.health.probe_interval(), config.interactive),
    )
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_recent_check(mut self, window: Duration) -> Self {
    self.recent_check = window;
    self
  }

  pub fn with_fallback(mut self, fallback: StaticFallbackDataset) -> Self {
    self.fallback = fallback;
    self
  }

  pub fn with_probe(mut self, interval: std::time::Duration, interactive: bool) -> Self {
    self.probe_interval = interval;
    self.interactive = interactive;
    self
  }

  pub fn cache(&self) -> &PersistentStore {
    &self.cache
  }

  pub fn health(&self) -> &HealthMonitor {
    &self.health
  }

  pub fn health_state(&self) -> HealthState {
    self.health.state()
  }

  /// Run the health probe now, for "retry now" affordances.
  pub async fn force_health_check(&self) -> HealthState {
    probe_once(self.api.as_ref(), &self.health, self.notifier.as_ref()).await
  }

  /// A background probe sharing this client's health state. Not started.
  pub fn health_probe(&self) -> HealthProbe {
    HealthProbe::new(
      Arc::clone(&self.api),
      Arc::clone(&self.health),
      Arc::clone(&self.notifier),
      self.probe_interval,
      self.interactive,
    )
  }

  // ==========================================================================
  // Reads
  // ==========================================================================

  pub async fn get_collections(&self) -> Vec<Collection> {
    self.get_collections_with_source().await.data
  }

  pub async fn get_collections_with_source(&self) -> CacheResult<Vec<Collection>> {
    self
      .read_through(
        Store::Collections,
        ALL_COLLECTIONS_KEY,
        ttl::collections(),
        || {
          let api = Arc::clone(&self.api);
          async move { api.list_collections().await }
        },
        || self.fallback.collections().to_vec(),
      )
      .await
  }

  pub async fn get_books(&self, collection_id: &str) -> Vec<Book> {
    self.get_books_with_source(collection_id).await.data
  }

  pub async fn get_books_with_source(&self, collection_id: &str) -> CacheResult<Vec<Book>> {
    self
      .read_through(
        Store::Books,
        collection_id,
        ttl::books(),
        || {
          let api = Arc::clone(&self.api);
          let collection_id = collection_id.to_string();
          async move { api.list_books(&collection_id).await }
        },
        || {
          self
            .declared_collection(collection_id)
            .map(|c| placeholder_books(&c))
            .unwrap_or_default()
        },
      )
      .await
  }

  pub async fn get_records(&self, query: &RecordQuery) -> RecordPage {
    self.get_records_with_source(query).await.data
  }

  pub async fn get_records_with_source(&self, query: &RecordQuery) -> CacheResult<RecordPage> {
    self
      .read_through(
        Store::Hadiths,
        &query.cache_key(),
        ttl::records(),
        || {
          let api = Arc::clone(&self.api);
          let query = query.clone();
          async move { api.list_records(&query).await }
        },
        || RecordPage::unavailable(query.page, query.per_page),
      )
      .await
  }

  /// The daily record, cached per UTC calendar date.
  pub async fn get_daily_record(&self) -> Record {
    self.get_daily_record_with_source().await.data
  }

  pub async fn get_daily_record_with_source(&self) -> CacheResult<Record> {
    let date = self.clock.now().format("%Y-%m-%d").to_string();
    self
      .read_through(
        Store::Daily,
        &date,
        ttl::daily(),
        || {
          let api = Arc::clone(&self.api);
          async move { api.daily_record().await }
        },
        || self.fallback.daily_record().clone(),
      )
      .await
  }

  /// Free-text search. Never cached; empty while the service is believed
  /// offline, and empty on any failure.
  pub async fn search(&self, query: &str) -> Vec<Record> {
    let query = query.trim();
    if query.is_empty() {
      return Vec::new();
    }
    if !self.health.is_online() {
      debug!(query, "Offline, skipping search");
      return Vec::new();
    }

    let result = self
      .retry
      .run(|| {
        let api = Arc::clone(&self.api);
        let query = query.to_string();
        async move { api.search(&query).await }
      })
      .await;

    match result {
      Ok(records) => {
        self.health.record_success();
        records
      }
      Err(err) => {
        self.note_failure("search", query, &err);
        Vec::new()
      }
    }
  }

  /// Fetch the collection list and every collection's books so they are
  /// cached for offline use.
  pub async fn warm(&self) -> WarmSummary {
    let collections = self.get_collections_with_source().await;

    let books = futures::future::join_all(
      collections
        .data
        .iter()
        .map(|c| self.get_books_with_source(&c.id)),
    )
    .await;

    let summary = WarmSummary {
      collections: collections.data.len(),
      collections_source: collections.source,
      books_refreshed: books
        .iter()
        .filter(|b| b.source == CacheSource::Network)
        .count(),
    };
    info!(
      collections = summary.collections,
      books_refreshed = summary.books_refreshed,
      "Cache warmed"
    );
    summary
  }

  // ==========================================================================
  // Internals
  // ==========================================================================

  /// Shared read path for every cached operation.
  async fn read_through<T, F, Fut>(
    &self,
    store: Store,
    key: &str,
    ttl: Duration,
    fetch: F,
    fallback: impl FnOnce() -> T,
  ) -> CacheResult<T>
  where
    T: Serialize + DeserializeOwned,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
  {
    let now = self.clock.now();
    let cached = match self.cache.get_entry::<T>(store, key) {
      Some(entry) if entry.is_valid(now) && self.prefer_cache(now) => {
        debug!(%store, key, "Cache hit");
        return CacheResult::from_cache(entry.data, entry.created_at);
      }
      other => other,
    };

    match self.retry.run(fetch).await {
      Ok(data) => {
        self.cache.set(store, key, &data, ttl);
        self.health.record_success();
        CacheResult::from_network(data)
      }
      Err(err) => {
        self.note_failure(store.as_str(), key, &err);
        match cached {
          Some(entry) => {
            debug!(%store, key, cached_at = %entry.created_at, "Serving cached data after failure");
            CacheResult::offline(entry.data, entry.created_at)
          }
          None => {
            debug!(%store, key, "Serving fallback data");
            CacheResult::fallback(fallback())
          }
        }
      }
    }
  }

  /// Skip the network when we know it is down, or when a check just happened.
  fn prefer_cache(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
    let state = self.health.state();
    !state.is_online || now - state.last_check_time < self.recent_check
  }

  fn note_failure(&self, what: &str, key: &str, err: &FetchError) {
    warn!(what, key, error = %err, "Content request failed");
    if self.health.record_failure() {
      self.notifier.notify(DEGRADED_MESSAGE, Severity::Warning);
    }
  }

  /// Declared counts for a collection: cached list first, even if expired.
  fn declared_collection(&self, collection_id: &str) -> Option<Collection> {
    self
      .cache
      .get_entry::<Vec<Collection>>(Store::Collections, ALL_COLLECTIONS_KEY)
      .and_then(|entry| entry.data.into_iter().find(|c| c.id == collection_id))
      .or_else(|| self.fallback.collection(collection_id).cloned())
  }
}
