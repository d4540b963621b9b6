//! Bounded retries with a fixed backoff schedule.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::FetchError;
use crate::config::RetryConfig;

/// Retry behavior for remote calls.
///
/// Client errors are returned after the first attempt. Anything else is
/// retried until `attempts` calls have been made, waiting `backoff[i]` after
/// failed attempt `i` (or `fallback_backoff` past the end of the schedule).
/// No jitter and no overall deadline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  pub attempts: u32,
  pub backoff: Vec<Duration>,
  pub fallback_backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from(&RetryConfig::default())
  }
}

impl From<&RetryConfig> for RetryPolicy {
  fn from(config: &RetryConfig) -> Self {
    Self {
      attempts: config.attempts,
      backoff: config
        .backoff_ms
        .iter()
        .copied()
        .map(Duration::from_millis)
        .collect(),
      fallback_backoff: Duration::from_millis(config.fallback_backoff_ms),
    }
  }
}

impl RetryPolicy {
  /// Same schedule, different attempt budget.
  pub fn with_attempts(mut self, attempts: u32) -> Self {
    self.attempts = attempts;
    self
  }

  /// Wait after the failed attempt with zero-based index `attempt`.
  pub fn delay_for(&self, attempt: usize) -> Duration {
    self
      .backoff
      .get(attempt)
      .copied()
      .unwrap_or(self.fallback_backoff)
  }

  /// Run `op` until it succeeds, fails with a client error, or the attempt
  /// budget is spent. Returns the last error in the failure cases.
  pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, FetchError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
  {
    let attempts = self.attempts.max(1) as usize;
    let mut attempt = 0;

    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(err) if !err.is_retryable() => {
          debug!(error = %err, "Not retrying client error");
          return Err(err);
        }
        Err(err) => {
          attempt += 1;
          if attempt >= attempts {
            warn!(attempts, error = %err, "Giving up after retries");
            return Err(err);
          }
          let delay = self.delay_for(attempt - 1);
          debug!(attempt, ?delay, error = %err, "Retrying after backoff");
          tokio::time::sleep(delay).await;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use tokio::time::Instant;

  fn counting<T>(
    calls: &Arc<AtomicUsize>,
    outcome: impl Fn(usize) -> Result<T, FetchError>,
  ) -> impl FnMut() -> std::future::Ready<Result<T, FetchError>> {
    let calls = calls.clone();
    move || {
      let n = calls.fetch_add(1, Ordering::SeqCst);
      std::future::ready(outcome(n))
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_client_error_attempted_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let result: Result<(), _> = RetryPolicy::default()
      .run(counting(&calls, |_| Err(FetchError::from_status(404, "missing"))))
      .await;

    assert!(matches!(result, Err(FetchError::Client { status: 404, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
  }

  #[tokio::test(start_paused = true)]
  async fn test_transient_errors_use_full_budget() {
    let calls = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let result: Result<(), _> = RetryPolicy::default()
      .run(counting(&calls, |_| Err(FetchError::Server { status: 503 })))
      .await;

    assert_eq!(result, Err(FetchError::Server { status: 503 }));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Waits of 1s and 2s between the three attempts.
    assert_eq!(start.elapsed(), Duration::from_secs(3));
  }

  #[tokio::test(start_paused = true)]
  async fn test_backoff_schedule_then_fallback_delay() {
    let calls = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let result: Result<(), _> = RetryPolicy::default()
      .with_attempts(5)
      .run(counting(&calls, |_| Err(FetchError::Timeout)))
      .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    // 1 + 2 + 4 + 5
    assert_eq!(start.elapsed(), Duration::from_secs(12));
  }

  #[tokio::test(start_paused = true)]
  async fn test_recovers_mid_sequence() {
    let calls = Arc::new(AtomicUsize::new(0));

    let result = RetryPolicy::default()
      .run(counting(&calls, |n| {
        if n == 0 {
          Err(FetchError::Transport("reset".into()))
        } else {
          Ok(n)
        }
      }))
      .await;

    assert_eq!(result, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_delay_for() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay_for(0), Duration::from_secs(1));
    assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    assert_eq!(policy.delay_for(3), Duration::from_secs(5));
    assert_eq!(policy.delay_for(10), Duration::from_secs(5));
  }
}
