use crate::api::api_types::{convert_all, ApiBook, ApiCollection, ApiRecord, ApiRecordPage};
use crate::api::error::FetchError;
use crate::api::types::{Book, Collection, Record, RecordPage, RecordQuery};
use crate::config::Config;
use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// The read endpoints of the remote content service.
#[async_trait]
pub trait ContentApi: Send + Sync {
  /// `GET collections`
  async fn list_collections(&self) -> Result<Vec<Collection>, FetchError>;

  /// `GET collections/{id}/books`
  async fn list_books(&self, collection: &str) -> Result<Vec<Book>, FetchError>;

  /// `GET collections/{id}/[books/{n}/]records?page&perPage`
  async fn list_records(&self, query: &RecordQuery) -> Result<RecordPage, FetchError>;

  /// `GET records/search?q=`
  async fn search(&self, query: &str) -> Result<Vec<Record>, FetchError>;

  /// `GET daily-record`
  async fn daily_record(&self) -> Result<Record, FetchError>;
}

/// HTTP+JSON client for the content service
#[derive(Clone)]
pub struct HttpContentApi {
  http: reqwest::Client,
  base: Url,
  api_key: Option<String>,
}

impl HttpContentApi {
  pub fn new(config: &Config) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .user_agent(concat!("hadith-cache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base: base_url(&config.api.url)?,
      api_key: Config::get_api_key(),
    })
  }

  /// Origin of the service, used to scope persisted state.
  pub fn origin(&self) -> String {
    self.base.origin().ascii_serialization()
  }

  async fn get_json<T: DeserializeOwned, S: AsRef<str>>(
    &self,
    segments: &[S],
    query: &[(&str, String)],
  ) -> Result<T, FetchError> {
    let url = endpoint_url(&self.base, segments)?;
    debug!(%url, "GET");

    let mut request = self.http.get(url).query(query);
    if let Some(key) = &self.api_key {
      request = request.header("X-API-Key", key);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(FetchError::from_status(status.as_u16(), &body));
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
  }
}

/// Parse the configured base URL, keeping its path as the endpoint prefix.
pub fn base_url(raw: &str) -> Result<Url> {
  let mut raw = raw.trim().to_string();
  if !raw.ends_with('/') {
    raw.push('/');
  }
  let url = Url::parse(&raw).map_err(|e| eyre!("Invalid API url {}: {}", raw, e))?;
  if !matches!(url.scheme(), "http" | "https") {
    return Err(eyre!("API url must be http or https: {}", raw));
  }
  Ok(url)
}

/// Append `segments` to the base path. Each segment is percent-encoded on its
/// own, so ids containing `/`, `?` or `#` cannot change the endpoint.
pub fn endpoint_url<S: AsRef<str>>(base: &Url, segments: &[S]) -> Result<Url, FetchError> {
  if let Some(bad) = segments
    .iter()
    .map(|s| s.as_ref())
    .find(|s| s.is_empty() || *s == "." || *s == "..")
  {
    return Err(FetchError::Invalid(format!("invalid path segment {:?}", bad)));
  }

  let mut url = base.clone();
  url
    .path_segments_mut()
    .map_err(|_| FetchError::Invalid(format!("cannot extend base url {}", base)))?
    .pop_if_empty()
    .extend(segments);
  Ok(url)
}

/// Path segments of the records endpoint for `query`
pub fn records_segments(query: &RecordQuery) -> Vec<String> {
  let mut segments = vec!["collections".to_string(), query.collection.clone()];
  if let Some(book) = query.book {
    segments.push("books".to_string());
    segments.push(book.to_string());
  }
  segments.push("records".to_string());
  segments
}

#[async_trait]
impl ContentApi for HttpContentApi {
  async fn list_collections(&self) -> Result<Vec<Collection>, FetchError> {
    let response: Vec<ApiCollection> = self.get_json(&["collections"], &[]).await?;
    convert_all(response, ApiCollection::into_domain)
  }

  async fn list_books(&self, collection: &str) -> Result<Vec<Book>, FetchError> {
    let response: Vec<ApiBook> = self
      .get_json(&["collections", collection, "books"], &[])
      .await?;
    convert_all(response, |book| book.into_domain(collection))
  }

  async fn list_records(&self, query: &RecordQuery) -> Result<RecordPage, FetchError> {
    let params = [
      ("page", query.page.to_string()),
      ("perPage", query.per_page.to_string()),
    ];
    let response: ApiRecordPage = self
      .get_json(&records_segments(query), &params)
      .await?;
    response.into_domain(query.per_page)
  }

  async fn search(&self, query: &str) -> Result<Vec<Record>, FetchError> {
    let response: Vec<ApiRecord> = self
      .get_json(&["records", "search"], &[("q", query.to_string())])
      .await?;
    convert_all(response, ApiRecord::into_domain)
  }

  async fn daily_record(&self) -> Result<Record, FetchError> {
    let response: ApiRecord = self.get_json(&["daily-record"], &[]).await?;
    response.into_domain()
  }
}
