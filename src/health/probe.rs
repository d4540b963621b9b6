use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::monitor::{HealthMonitor, HealthState};
use super::DEGRADED_MESSAGE;
use crate::api::ContentApi;
use crate::notify::{Notifier, Severity};

/// Issue one lightweight request and record its outcome.
pub async fn probe_once(
  api: &dyn ContentApi,
  health: &HealthMonitor,
  notifier: &dyn Notifier,
) -> HealthState {
  match api.list_collections().await {
    Ok(_) => health.record_success(),
    Err(e) => {
      debug!(error = %e, "Health probe failed");
      if health.record_failure() {
        notifier.notify(DEGRADED_MESSAGE, Severity::Warning);
      }
    }
  }
  health.state()
}

/// Periodic background probe with an explicit start/stop lifecycle.
///
/// Only runs in interactive contexts; `start` is a no-op otherwise. Dropping
/// the probe stops it.
pub struct HealthProbe {
  api: Arc<dyn ContentApi>,
  health: Arc<HealthMonitor>,
  notifier: Arc<dyn Notifier>,
  period: Duration,
  interactive: bool,
  handle: Option<JoinHandle<()>>,
}

impl HealthProbe {
  pub fn new(
    api: Arc<dyn ContentApi>,
    health: Arc<HealthMonitor>,
    notifier: Arc<dyn Notifier>,
    period: Duration,
    interactive: bool,
  ) -> Self {
    Self {
      api,
      health,
      notifier,
      period,
      interactive,
      handle: None,
    }
  }

  /// Spawn the probe loop on the current tokio runtime. The first probe
  /// fires one period after starting.
  pub fn start(&mut self) {
    if !self.interactive {
      debug!("Non-interactive context, health probe not started");
      return;
    }
    if self.is_running() {
      return;
    }

    let api = Arc::clone(&self.api);
    let health = Arc::clone(&self.health);
    let notifier = Arc::clone(&self.notifier);
    let period = self.period.max(Duration::from_millis(1));

    self.handle = Some(tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let state = probe_once(api.as_ref(), &health, notifier.as_ref()).await;
        debug!(online = state.is_online, failures = state.consecutive_failures, "Health probe");
      }
    }));
    debug!(?period, "Health probe started");
  }

  pub fn stop(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.abort();
      debug!("Health probe stopped");
    }
  }

  pub fn is_running(&self) -> bool {
    self
      .handle
      .as_ref()
      .map(|h| !h.is_finished())
      .unwrap_or(false)
  }
}

impl Drop for HealthProbe {
  fn drop(&mut self) {
    self.stop();
  }
}
