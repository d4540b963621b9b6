//! Serde-deserializable types matching content service responses.
//!
//! These types are separate from domain types so that responses are
//! validated once at the network boundary; nothing past this module sees
//! untyped JSON.

use serde::Deserialize;
use serde_json::Value;

use super::error::FetchError;
use super::types::{Book, Collection, Record, RecordPage};

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCollection {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub name: String,
  pub localized_name: Option<String>,
  pub author: Option<String>,
  pub description: Option<String>,
  #[serde(default)]
  pub total_record_count: u32,
  #[serde(default)]
  pub sub_unit_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBook {
  #[serde(default)]
  pub number: Value,
  #[serde(default)]
  pub name: String,
  pub localized_name: Option<String>,
  #[serde(default)]
  pub record_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRecord {
  #[serde(default)]
  pub id: Value,
  #[serde(default)]
  pub collection_id: String,
  pub book_number: Option<Value>,
  pub number: Option<Value>,
  #[serde(default)]
  pub text: String,
  pub localized_text: Option<String>,
  pub narrator: Option<String>,
  pub grade: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRecordPage {
  #[serde(default)]
  pub items: Vec<ApiRecord>,
  #[serde(default)]
  pub total: u32,
  #[serde(default = "first_page")]
  pub page: u32,
  #[serde(default)]
  pub per_page: u32,
}

fn first_page() -> u32 {
  1
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl ApiCollection {
  pub fn into_domain(self) -> Result<Collection, FetchError> {
    let id = self.id.trim().to_string();
    if id.is_empty() {
      return Err(FetchError::Invalid("collection without id".to_string()));
    }
    Ok(Collection {
      name: if self.name.is_empty() {
        id.clone()
      } else {
        self.name
      },
      id,
      localized_name: non_empty(self.localized_name),
      author: non_empty(self.author),
      description: non_empty(self.description),
      total_record_count: self.total_record_count,
      sub_unit_count: self.sub_unit_count,
    })
  }
}

impl ApiBook {
  pub fn into_domain(self, collection_id: &str) -> Result<Book, FetchError> {
    let number = as_u32(&self.number)
      .ok_or_else(|| FetchError::Invalid(format!("book number {} is not a number", self.number)))?;
    Ok(Book {
      collection_id: collection_id.to_string(),
      number,
      name: if self.name.is_empty() {
        format!("Book {}", number)
      } else {
        self.name
      },
      localized_name: non_empty(self.localized_name),
      record_count: self.record_count,
    })
  }
}

impl ApiRecord {
  pub fn into_domain(self) -> Result<Record, FetchError> {
    let id = as_string(&self.id)
      .filter(|id| !id.is_empty())
      .ok_or_else(|| FetchError::Invalid("record without id".to_string()))?;
    if self.text.trim().is_empty() {
      return Err(FetchError::Invalid(format!("record {} has no text", id)));
    }
    Ok(Record {
      number: self
        .number
        .as_ref()
        .and_then(as_string)
        .unwrap_or_else(|| id.clone()),
      id,
      collection_id: self.collection_id,
      book_number: self.book_number.as_ref().and_then(as_u32),
      text: self.text,
      localized_text: non_empty(self.localized_text),
      narrator: non_empty(self.narrator),
      grade: non_empty(self.grade),
    })
  }
}

impl ApiRecordPage {
  pub fn into_domain(self, requested_per_page: u32) -> Result<RecordPage, FetchError> {
    let items = convert_all(self.items, ApiRecord::into_domain)?;
    Ok(RecordPage {
      total: self.total.max(items.len() as u32),
      page: self.page.max(1),
      per_page: if self.per_page == 0 {
        requested_per_page
      } else {
        self.per_page
      },
      items,
      message: None,
    })
  }
}

/// Convert a list, failing on the first invalid element.
pub fn convert_all<A, T>(
  items: Vec<A>,
  convert: impl Fn(A) -> Result<T, FetchError>,
) -> Result<Vec<T>, FetchError> {
  items.into_iter().map(convert).collect()
}

// ============================================================================
// Helpers
// ============================================================================

fn non_empty(value: Option<String>) -> Option<String> {
  value.filter(|s| !s.trim().is_empty())
}

/// Accept both `12` and `"12"`
fn as_u32(value: &Value) -> Option<u32> {
  match value {
    Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// Accept both `"12a"` and `12`
fn as_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.trim().to_string()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}
