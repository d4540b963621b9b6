//! Test doubles shared by unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{Book, Collection, ContentApi, FetchError, Record, RecordPage, RecordQuery};
use crate::notify::{Notification, Notifier, Severity};

/// In-process content service that counts calls per endpoint.
pub struct MockApi {
  failure: Mutex<Option<FetchError>>,
  calls: Mutex<HashMap<&'static str, usize>>,
  delay: Option<Duration>,
}

impl MockApi {
  pub fn online() -> Self {
    Self {
      failure: Mutex::new(None),
      calls: Mutex::new(HashMap::new()),
      delay: None,
    }
  }

  pub fn failing(err: FetchError) -> Self {
    let api = Self::online();
    api.set_failing(err);
    api
  }

  /// Every call takes `delay` before answering.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn set_online(&self) {
    *self.failure.lock().unwrap() = None;
  }

  pub fn set_failing(&self, err: FetchError) {
    *self.failure.lock().unwrap() = Some(err);
  }

  pub fn calls(&self, endpoint: &str) -> usize {
    self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
  }

  pub fn total_calls(&self) -> usize {
    self.calls.lock().unwrap().values().sum()
  }

  async fn enter(&self, endpoint: &'static str) -> Result<(), FetchError> {
    *self.calls.lock().unwrap().entry(endpoint).or_default() += 1;
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    match self.failure.lock().unwrap().clone() {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }
}

pub fn collection(id: &str, total: u32, books: u32) -> Collection {
  Collection {
    id: id.to_string(),
    name: format!("Collection {}", id),
    localized_name: None,
    author: None,
    description: None,
    total_record_count: total,
    sub_unit_count: books,
  }
}

pub fn record(id: &str, collection_id: &str) -> Record {
  Record {
    id: id.to_string(),
    collection_id: collection_id.to_string(),
    book_number: Some(1),
    number: id.to_string(),
    text: format!("text of {}", id),
    localized_text: None,
    narrator: None,
    grade: None,
  }
}

#[async_trait]
impl ContentApi for MockApi {
  async fn list_collections(&self) -> Result<Vec<Collection>, FetchError> {
    self.enter("collections").await?;
    Ok(vec![collection("bukhari", 7563, 97), collection("muslim", 7470, 56)])
  }

  async fn list_books(&self, collection_id: &str) -> Result<Vec<Book>, FetchError> {
    self.enter("books").await?;
    Ok(
      (1..=2)
        .map(|number| Book {
          collection_id: collection_id.to_string(),
          number,
          name: format!("Network book {}", number),
          localized_name: None,
          record_count: 5,
        })
        .collect(),
    )
  }

  async fn list_records(&self, query: &RecordQuery) -> Result<RecordPage, FetchError> {
    self.enter("records").await?;
    Ok(RecordPage {
      items: vec![record("1", &query.collection)],
      total: 1,
      page: query.page,
      per_page: query.per_page,
      message: None,
    })
  }

  async fn search(&self, query: &str) -> Result<Vec<Record>, FetchError> {
    self.enter("search").await?;
    Ok(vec![record(&format!("match:{}", query), "bukhari")])
  }

  async fn daily_record(&self) -> Result<Record, FetchError> {
    self.enter("daily").await?;
    Ok(record("network:daily", "muslim"))
  }
}

/// Keeps every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
  received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
  pub fn messages(&self) -> Vec<Notification> {
    self.received.lock().unwrap().clone()
  }
}

impl Notifier for RecordingNotifier {
  fn notify(&self, message: &str, severity: Severity) {
    self.received.lock().unwrap().push(Notification {
      message: message.to_string(),
      severity,
    });
  }
}
