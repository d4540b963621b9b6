use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

use crate::clock::Clock;

/// Snapshot of what we believe about the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthState {
  pub is_online: bool,
  pub last_check_time: DateTime<Utc>,
  pub consecutive_failures: u32,
}

/// Consecutive-failure counter with a reachability flag.
///
/// Reaching `failure_threshold` failures marks the service offline. Any
/// success brings it back. There is no half-open state and nothing stops
/// callers from trying the network while offline.
pub struct HealthMonitor {
  state: Mutex<HealthState>,
  clock: Arc<dyn Clock>,
  failure_threshold: u32,
}

impl HealthMonitor {
  pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self::with_threshold(clock, Self::DEFAULT_FAILURE_THRESHOLD)
  }

  pub fn with_threshold(clock: Arc<dyn Clock>, failure_threshold: u32) -> Self {
    let state = HealthState {
      is_online: true,
      last_check_time: clock.now(),
      consecutive_failures: 0,
    };
    Self {
      state: Mutex::new(state),
      clock,
      failure_threshold: failure_threshold.max(1),
    }
  }

  fn lock(&self) -> MutexGuard<'_, HealthState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn state(&self) -> HealthState {
    *self.lock()
  }

  pub fn is_online(&self) -> bool {
    self.lock().is_online
  }

  pub fn record_success(&self) {
    let mut state = self.lock();
    if !state.is_online {
      info!(
        failures = state.consecutive_failures,
        "Content service reachable again"
      );
    }
    state.consecutive_failures = 0;
    state.is_online = true;
    state.last_check_time = self.clock.now();
  }

  /// Count a failed call. Returns `true` only for the call that flipped the
  /// service from online to offline.
  pub fn record_failure(&self) -> bool {
    let mut state = self.lock();
    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
    state.last_check_time = self.clock.now();

    let tripped = state.is_online && state.consecutive_failures >= self.failure_threshold;
    if tripped {
      state.is_online = false;
      info!(
        failures = state.consecutive_failures,
        "Content service marked offline"
      );
    }
    tripped
  }

  /// Back to the initial state.
  pub fn reset(&self) {
    *self.lock() = HealthState {
      is_online: true,
      last_check_time: self.clock.now(),
      consecutive_failures: 0,
    };
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use chrono::Duration;

  fn monitor() -> (HealthMonitor, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    (HealthMonitor::new(clock.clone()), clock)
  }

  #[test]
  fn test_initial_state() {
    let (monitor, clock) = monitor();
    let state = monitor.state();
    assert!(state.is_online);
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.last_check_time, clock.now());
  }

  #[test]
  fn test_three_failures_trip_and_one_success_resets() {
    let (monitor, _) = monitor();

    assert!(!monitor.record_failure());
    assert!(!monitor.record_failure());
    assert!(monitor.is_online());

    assert!(monitor.record_failure());
    assert!(!monitor.is_online());
    assert_eq!(monitor.state().consecutive_failures, 3);

    monitor.record_success();
    let state = monitor.state();
    assert!(state.is_online);
    assert_eq!(state.consecutive_failures, 0);
  }

  #[test]
  fn test_trip_reported_once() {
    let (monitor, _) = monitor();
    let trips: Vec<bool> = (0..6).map(|_| monitor.record_failure()).collect();
    assert_eq!(trips, vec![false, false, true, false, false, false]);
    assert_eq!(monitor.state().consecutive_failures, 6);
  }

  #[test]
  fn test_every_outcome_updates_last_check() {
    let (monitor, clock) = monitor();

    clock.advance(Duration::seconds(10));
    monitor.record_failure();
    assert_eq!(monitor.state().last_check_time, clock.now());

    clock.advance(Duration::seconds(10));
    monitor.record_success();
    assert_eq!(monitor.state().last_check_time, clock.now());
  }

  #[test]
  fn test_success_between_failures_restarts_count() {
    let (monitor, _) = monitor();
    monitor.record_failure();
    monitor.record_failure();
    monitor.record_success();
    monitor.record_failure();
    monitor.record_failure();
    assert!(monitor.is_online());
  }

  #[test]
  fn test_reset_restores_initial_state_and_rearms_trip() {
    let (monitor, clock) = monitor();
    for _ in 0..4 {
      monitor.record_failure();
    }
    assert!(!monitor.is_online());

    let restart = clock.now() + Duration::hours(2);
    clock.set(restart);
    monitor.reset();

    let state = monitor.state();
    assert!(state.is_online);
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.last_check_time, restart);

    let trips: Vec<bool> = (0..3).map(|_| monitor.record_failure()).collect();
    assert_eq!(trips, vec![false, false, true]);
  }
}
