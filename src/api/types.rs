use serde::{Deserialize, Serialize};

/// A hadith collection, e.g. Sahih al-Bukhari
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
  pub id: String,
  pub name: String,
  pub localized_name: Option<String>,
  pub author: Option<String>,
  pub description: Option<String>,
  /// Number of hadiths in the collection
  pub total_record_count: u32,
  /// Number of books in the collection
  pub sub_unit_count: u32,
}

/// A book within a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
  pub collection_id: String,
  pub number: u32,
  pub name: String,
  pub localized_name: Option<String>,
  pub record_count: u32,
}

/// A single hadith
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
  pub id: String,
  pub collection_id: String,
  pub book_number: Option<u32>,
  /// Hadith number as printed, can carry suffixes like "12a"
  pub number: String,
  pub text: String,
  pub localized_text: Option<String>,
  pub narrator: Option<String>,
  pub grade: Option<String>,
}

/// One page of records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
  pub items: Vec<Record>,
  pub total: u32,
  pub page: u32,
  pub per_page: u32,
  /// Set when the page could not be loaded
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

impl RecordPage {
  /// Empty page returned when nothing could be loaded.
  pub fn unavailable(page: u32, per_page: u32) -> Self {
    Self {
      items: Vec::new(),
      total: 0,
      page,
      per_page,
      message: Some("unable to load".to_string()),
    }
  }
}

/// Parameters of a paginated records request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
  pub collection: String,
  pub book: Option<u32>,
  pub page: u32,
  pub per_page: u32,
}

impl RecordQuery {
  pub const DEFAULT_PER_PAGE: u32 = 20;

  pub fn new(collection: impl Into<String>, book: Option<u32>, page: u32, per_page: u32) -> Self {
    Self {
      collection: collection.into(),
      book,
      page: page.max(1),
      per_page: per_page.max(1),
    }
  }

  /// Cache key: `<collection>:<book|all>:<page>:<perPage>`
  pub fn cache_key(&self) -> String {
    let book = self
      .book
      .map(|b| b.to_string())
      .unwrap_or_else(|| "all".to_string());
    format!("{}:{}:{}:{}", self.collection, book, self.page, self.per_page)
  }
}
