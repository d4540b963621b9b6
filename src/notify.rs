//! Side channel used to tell the UI layer about degraded service.

use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Info,
  Warning,
  Error,
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Severity::Info => "info",
      Severity::Warning => "warning",
      Severity::Error => "error",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub message: String,
  pub severity: Severity,
}

/// Receiver of user-facing notices.
pub trait Notifier: Send + Sync {
  fn notify(&self, message: &str, severity: Severity);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  fn notify(&self, message: &str, severity: Severity) {
    match severity {
      Severity::Info => info!(%severity, "{}", message),
      Severity::Warning | Severity::Error => warn!(%severity, "{}", message),
    }
  }
}

/// Forwards notifications to a UI event loop.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }
}

impl Notifier for ChannelNotifier {
  fn notify(&self, message: &str, severity: Severity) {
    // Receiver gone means the UI shut down; nothing to tell.
    let _ = self.tx.send(Notification {
      message: message.to_string(),
      severity,
    });
  }
}
