use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when neither `RUST_LOG` nor `--log-level` is given.
pub const DEFAULT_FILTER: &str = "hadith_cache=info,warn";

/// `RUST_LOG` wins over `level`.
fn env_filter(level: &str) -> Result<EnvFilter> {
  EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(level))
    .map_err(|e| eyre!("Invalid log filter {:?}: {}", level, e))
}

/// Install the global subscriber.
///
/// Logs go to a daily rolling file under `log_dir` when one is given, and to
/// stderr when `verbose` is set. Keep the returned guard alive until exit so
/// buffered lines are flushed.
pub fn init(log_dir: Option<&Path>, verbose: bool, level: &str) -> Result<Option<WorkerGuard>> {
  let filter = env_filter(level)?;

  let (file_layer, guard) = match log_dir {
    Some(dir) => {
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let appender = tracing_appender::rolling::daily(dir, "hadith-cache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  let stderr_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_filter_parses() {
    assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
  }

  #[test]
  fn test_bad_level_is_an_error() {
    if std::env::var_os("RUST_LOG").is_some() {
      return;
    }
    assert!(env_filter("hadith_cache=loud").is_err());
  }
}
