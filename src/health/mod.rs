//! Reachability tracking for the content service.

mod monitor;
mod probe;

pub use monitor::{HealthMonitor, HealthState};
pub use probe::{probe_once, HealthProbe};

/// Shown once when the service is marked offline.
pub const DEGRADED_MESSAGE: &str =
  "Content service is unreachable. Showing cached or offline content.";
