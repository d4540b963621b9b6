//! Embedded snapshot served when there is neither network nor cache.

use serde::Deserialize;
use tracing::error;

use crate::api::{Book, Collection, Record};

const EMBEDDED: &str = include_str!("../data/fallback.json");

/// Most placeholder books synthesized for one collection.
pub const MAX_PLACEHOLDER_BOOKS: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct StaticFallbackDataset {
  collections: Vec<Collection>,
  daily: Record,
}

impl StaticFallbackDataset {
  /// The snapshot compiled into the binary.
  pub fn embedded() -> Self {
    Self::from_json(EMBEDDED).unwrap_or_else(|e| {
      error!(error = %e, "Embedded fallback dataset is unreadable");
      Self {
        collections: Vec::new(),
        daily: Record {
          id: "offline:daily".to_string(),
          collection_id: String::new(),
          book_number: None,
          number: String::new(),
          text: "Content is not available offline.".to_string(),
          localized_text: None,
          narrator: None,
          grade: None,
        },
      }
    })
  }

  pub fn from_json(json: &str) -> serde_json::Result<Self> {
    serde_json::from_str(json)
  }

  pub fn collections(&self) -> &[Collection] {
    &self.collections
  }

  pub fn collection(&self, id: &str) -> Option<&Collection> {
    self.collections.iter().find(|c| c.id == id)
  }

  pub fn daily_record(&self) -> &Record {
    &self.daily
  }
}

/// Generic stand-in books for a collection whose real book list is unknown.
///
/// Produces `min(sub_unit_count, 10)` books that split the collection's
/// record count evenly, earlier books taking the remainder.
pub fn placeholder_books(collection: &Collection) -> Vec<Book> {
  let count = collection.sub_unit_count.min(MAX_PLACEHOLDER_BOOKS);
  if count == 0 {
    return Vec::new();
  }

  let base = collection.total_record_count / count;
  let remainder = collection.total_record_count % count;

  (1..=count)
    .map(|number| Book {
      collection_id: collection.id.clone(),
      number,
      name: format!("Book {}", number),
      localized_name: None,
      record_count: base + u32::from(number <= remainder),
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_embedded_dataset_parses() {
    let dataset = StaticFallbackDataset::from_json(EMBEDDED).unwrap();
    assert!(dataset.collections().len() >= 6);
    assert!(dataset.collection("bukhari").is_some());
    assert_eq!(dataset.daily_record().id, "bukhari:1");
  }

  #[test]
  fn test_placeholder_books_capped_at_ten() {
    let dataset = StaticFallbackDataset::embedded();
    let bukhari = dataset.collection("bukhari").unwrap();
    let books = placeholder_books(bukhari);

    assert_eq!(books.len(), 10);
    assert_eq!(
      books.iter().map(|b| b.record_count).sum::<u32>(),
      bukhari.total_record_count
    );
    assert!(books.iter().all(|b| b.collection_id == "bukhari"));
    assert_eq!(books[0].number, 1);
    assert_eq!(books[9].number, 10);
  }

  #[test]
  fn test_placeholder_books_small_collection() {
    let dataset = StaticFallbackDataset::embedded();
    let nawawi = dataset.collection("nawawi40").unwrap();
    let books = placeholder_books(nawawi);

    assert_eq!(books.len(), 1);
    assert_eq!(books[0].record_count, 42);
  }

  #[test]
  fn test_placeholder_split_is_even() {
    let collection = Collection {
      id: "c".into(),
      name: "C".into(),
      localized_name: None,
      author: None,
      description: None,
      total_record_count: 23,
      sub_unit_count: 4,
    };
    let counts: Vec<u32> = placeholder_books(&collection)
      .iter()
      .map(|b| b.record_count)
      .collect();
    assert_eq!(counts, vec![6, 6, 6, 5]);
  }

  #[test]
  fn test_no_books_declared() {
    let collection = Collection {
      id: "empty".into(),
      name: "Empty".into(),
      localized_name: None,
      author: None,
      description: None,
      total_record_count: 10,
      sub_unit_count: 0,
    };
    assert!(placeholder_books(&collection).is_empty());
  }
}
