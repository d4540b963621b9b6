use thiserror::Error;

/// Failure of a single call to the content service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  /// 4xx: the request itself is wrong, retrying cannot help
  #[error("request rejected with status {status}: {message}")]
  Client { status: u16, message: String },

  /// 5xx
  #[error("server error with status {status}")]
  Server { status: u16 },

  #[error("request timed out")]
  Timeout,

  /// Connection refused, DNS failure, reset, ...
  #[error("transport error: {0}")]
  Transport(String),

  /// Body was not the JSON shape we expect
  #[error("failed to decode response: {0}")]
  Decode(String),

  /// Body decoded but failed validation
  #[error("invalid response: {0}")]
  Invalid(String),
}

impl FetchError {
  /// Build the error for a non-success HTTP status.
  pub fn from_status(status: u16, body: &str) -> Self {
    if (400..500).contains(&status) {
      FetchError::Client {
        status,
        message: body.chars().take(200).collect(),
      }
    } else {
      FetchError::Server { status }
    }
  }

  /// Everything but client errors is worth another attempt.
  pub fn is_retryable(&self) -> bool {
    !matches!(self, FetchError::Client { .. })
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      FetchError::Timeout
    } else if let Some(status) = err.status() {
      FetchError::from_status(status.as_u16(), &err.to_string())
    } else if err.is_decode() {
      FetchError::Decode(err.to_string())
    } else {
      FetchError::Transport(err.to_string())
    }
  }
}
